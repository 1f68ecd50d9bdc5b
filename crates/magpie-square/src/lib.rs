//! Square connector for Magpie.
//!
//! Talks to the Square REST API on behalf of connected merchants:
//!
//! - OAuth authorization-code exchange and refresh-token rotation
//! - cursor-paginated, date-window-filtered customer retrieval with a
//!   fallback listing endpoint
//! - invoice search joined to batch-retrieved orders, producing the
//!   per-customer latest-invoice linkage
//!
//! The connector performs no retries of its own and holds no schedule state;
//! both live in `magpie-sync`.
//!
//! # Example
//!
//! ```no_run
//! use magpie_square::{CustomerFetcher, SquareClient};
//!
//! # async fn example() -> Result<(), magpie_square::SquareError> {
//! let client = SquareClient::new("https://connect.squareup.com", "2023-10-18")?;
//! let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
//! let customers = fetcher.fetch("merchant-access-token").await?;
//! println!("{} customers in window", customers.len());
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod customers;
mod error;
mod invoices;
mod merchants;

pub use auth::{OAuthClient, SquareCredentials, TokenGrant};
pub use client::{PagedFailure, SquareClient};
pub use customers::{map_customer, CustomerFetcher};
pub use error::{SquareError, SquareResult};
pub use invoices::{InvoiceLinker, LinkerOptions};
pub use merchants::fetch_business_name;
