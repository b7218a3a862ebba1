#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod coordinator;
mod error;
mod runtime;

pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::runtime::*;
