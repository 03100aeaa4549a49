pub use anyhow::{ensure, Result};
pub use ndarray::Array2;
pub use num_traits::Float;
pub use serde::{Deserialize, Serialize};
