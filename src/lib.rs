//! pixelfish: a dynamically-extensible pixel-format conversion library.
//!
//! A [`Context`] owns a world of registered [`Type`](descriptor::ty::Type),
//! [`Component`](descriptor::component::Component),
//! [`Model`](descriptor::model::Model) and
//! [`Format`](descriptor::format::Format) descriptors, plus the leaf
//! [`Conversion`](descriptor::conversion::Conversion) routines between them.
//! [`Context::find_conversion`] "fishes" a shortest-cost composite
//! [`Plan`](plan::Plan) between any two registered formats by routing
//! through a single canonical reference format, and [`Plan::process`] runs
//! that plan over a buffer of pixels.
//!
//! ```no_run
//! let ctx = pixelfish::Context::init().expect("built-in registration never fails");
//! let src = ctx.format_by_name("rgbaF_linear").unwrap();
//! let dst = ctx.format_by_name("RGBA-u8").unwrap();
//! let plan = ctx.find_conversion(src, dst).unwrap();
//! let pixels = vec![0.0f32; 4 * 16];
//! let mut out = vec![0u8; 4 * 16];
//! let processed = plan.process(bytemuck::cast_slice(&pixels), &mut out, 16);
//! assert_eq!(processed, 16);
//! ```

mod alloc;
mod builtins;
mod context;
mod descriptor;
mod error;
mod extension;
mod graph;
mod kernel;
mod plan;
mod registry;

pub use alloc::{AllocStrategy, SystemAlloc};
pub use context::Context;
pub use descriptor::component::Component;
pub use descriptor::conversion::{Edge, Kind as ConversionKind};
pub use descriptor::format::{Format, Layout};
pub use descriptor::model::Model;
pub use descriptor::ty::Type;
pub use descriptor::{ComponentRef, Descriptor, FormatRef, ModelRef, TypeRef};
pub use error::{Error, Result};
pub use extension::EXTENSION_PATH_VAR;
pub use kernel::Kernel;
pub use plan::Plan;
