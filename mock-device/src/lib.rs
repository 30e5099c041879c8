//! In-memory mock of the access-control terminal
//!
//! [`MockDevice`] serves the same ISAPI endpoints the client talks to, keyed
//! by `employeeNo`, plus a `/simulate-scan` hook that stands in for a finger
//! on the reader. Tests reach into the shared [`MockState`] to count requests,
//! inspect stored users, slow responses down or demand credentials.

pub mod error;
pub mod server;
pub mod state;

pub use error::{Fault, MockError};
pub use server::MockDevice;
pub use state::{DeviceIdentity, MockState, RequestRecord, StoredUser};
