//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (proxies, signals, memos, effects, watchers)
//! - A batching job scheduler with render and post phases
//! - Virtual nodes, blocks and the keyed tree reconciler
//!
//! Everything is single-threaded: state, effects and the job queue live on
//! the thread that created them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency tracking, proxies and derived state
//! - `scheduler`: Deduplicating job queues and flush executors
//! - `render`: VNodes, components and the patch algorithm
//! - `error`: The reported error taxonomy
//! - `config`: Per-thread runtime tuning
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{Reactive, Value};
//! use trellis_core::render::{h, Component, MemoryHost, Renderer, VNode};
//!
//! let state = Reactive::new_object([("count", Value::from(0))]);
//!
//! let counter = Component::builder("Counter")
//!     .render({
//!         let state = state.clone();
//!         move |_| h("p").text(state.get("count").to_string()).build()
//!     })
//!     .build();
//!
//! let host = Rc::new(MemoryHost::new());
//! let root = host.root();
//! Renderer::new(host.clone()).render(Some(VNode::component(&counter).build()), root);
//!
//! state.set("count", 1);
//! trellis_core::scheduler::tick();
//! // host now holds <p>1</p>
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use config::{configure, RuntimeConfig};
pub use error::{report, RuntimeError};
