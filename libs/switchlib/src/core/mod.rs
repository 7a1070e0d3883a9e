pub mod error;
pub mod group;
pub mod matrix;
pub mod ports;
pub mod registry;
pub mod signals;

pub use error::{Result, SwitchError};
pub use group::{MatrixGroup, SourceGroup};
pub use matrix::{AvailableSource, Driver, Matrix, MatrixInput};
pub use ports::MatrixOutput;
pub use registry::{get_source, list_sources, reset_sources};
pub use signals::{Sink, Source};
