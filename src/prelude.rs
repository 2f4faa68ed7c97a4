pub use std::sync::Arc;
pub use std::time::Duration;

pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use tokio::sync::broadcast;

pub use crate::channels::Channels;
pub use crate::config::Config;
pub use crate::options::Options;
pub use crate::reader::{Reader, Reading};
pub use crate::{config, mqtt, utils};
