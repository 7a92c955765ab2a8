//! Prelude module - commonly used types for convenient import.
//!
//! Use `use bulwark_test::prelude::*;` to import all essential helpers.

pub use crate::init_test_logging;

pub use crate::{TestWorkspace, fs_read_request, fs_write_request, network_request, shell_request};

pub use crate::RecordingPresenter;
