/*!
 * Remote repository adapter
 *
 * [`RemoteRepository`] is the seam the sync engine talks to;
 * [`GitRepository`] implements it on top of the `git` CLI.
 */

pub mod quarantine;
pub mod repository;
pub mod service;
pub mod types;

pub use quarantine::{Quarantine, QuarantinedFile, Reconciliation};
pub use repository::RemoteRepository;
pub use service::GitRepository;
pub use types::*;
