pub mod axis;
pub mod hist1d;
pub mod hist2d;

pub use axis::{Axis, AxisSpec, Bin};
pub use hist1d::{Hist1D, HistogramBin};
pub use hist2d::{Cell, Hist2D};
