//! mocharun static file server
//!
//! Exposes the repository root over loopback HTTP so the controlled browser
//! can load the harness page and the sources it imports.

pub mod server;
pub mod static_files;

pub use server::StaticServer;
pub use static_files::StaticFiles;
