//! PostgreSQL typed-value codecs and COPY bulk transfer.
//!
//! # Features
//!
//! - **Tri-state values**: every wire type carries undefined/null/present
//!   status explicitly; SQL NULL is never conflated with a native default
//! - **Binary and text codecs**: scalars, `bytea`, `hstore`, anonymous
//!   records and arrays, resolved through a run-time type registry
//! - **Sans-I/O state machines**: the COPY protocol logic is separated from
//!   I/O and drivable over any transport
//! - **Bulk transfer**: stream uploads from any [`std::io::Read`] and
//!   downloads into any [`std::io::Write`]
//!
//! # Example
//!
//! ```no_run
//! use pgbulk::copy::{Copier, CopyConnection, CopyFormat, CopyOption, CopyOptions};
//!
//! fn upload<C: CopyConnection>(conn: &mut C) -> pgbulk::error::Result<u64> {
//!     let options = CopyOptions::build(vec![CopyOption::Format(CopyFormat::Csv)])?;
//!     let mut source = std::fs::File::open("measurements.csv")?;
//!
//!     Copier::table("measurements")
//!         .columns(["city", "temp"])
//!         .options(options)
//!         .from_reader(conn, &mut source)
//! }
//! ```

pub mod buffer_set;
pub mod copy;
pub mod error;
pub mod protocol;
pub mod state;
pub mod value;

pub use buffer_set::BufferSet;
pub use copy::{Copier, CopyConnection, CopyFormat, CopyOption, CopyOptions};
pub use error::{Error, ErrorFields, Result};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use value::{IsNull, Status, Tristate, TypeRegistry, WireValue};
