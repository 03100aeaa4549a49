pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::{bbox_overlaps, BoxDelta, PixelBox};
pub use derivative::Derivative;
pub use futures::{
    future,
    stream::{self, Stream, StreamExt as _, TryStreamExt as _},
};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{chain, izip, Itertools as _};
pub use log::{debug, info, warn};
pub use ndarray::Array2;
pub use noisy_float::prelude::*;
pub use par_stream::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::HashSet,
    fmt::{self, Debug},
    iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{Arc, Mutex},
};

/// Box type of every ROI in this crate.
pub type RoiBox = PixelBox<f64>;
