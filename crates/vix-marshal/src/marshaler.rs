use crate::{
	engine::Engine,
	error::{describe, NativeCode},
	property::{Catalogue, PropertyId, PropertyKind},
};

use std::{fmt, sync::Arc, time::Duration};

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Entry point of the marshaling layer.
///
/// Wraps an [`Engine`] and the [`Catalogue`] requests are validated against. Cheap to clone,
/// every clone shares the same engine, so independent callers can wait on distinct jobs
/// concurrently.
#[derive(Clone)]
pub struct Marshaler {
	engine: Arc<dyn Engine>,
	catalogue: Arc<Catalogue>,
	wait_timeout: Duration,
}

impl Marshaler {
	/// A marshaler with the built-in catalogue and default settings, see [`MarshalerBuilder`].
	#[must_use]
	pub fn new(engine: Arc<dyn Engine>) -> Self {
		MarshalerBuilder::default().build(engine)
	}

	#[must_use]
	pub fn builder() -> MarshalerBuilder {
		MarshalerBuilder::new()
	}

	#[must_use]
	pub fn engine(&self) -> &Arc<dyn Engine> {
		&self.engine
	}

	#[must_use]
	pub fn catalogue(&self) -> &Catalogue {
		&self.catalogue
	}

	/// How long [`Marshaler::wait_async`] waits before giving up on a job.
	#[must_use]
	pub const fn wait_timeout(&self) -> Duration {
		self.wait_timeout
	}

	/// Human readable text for a native error code.
	#[must_use]
	pub fn describe(&self, code: NativeCode) -> String {
		describe(&*self.engine, code)
	}
}

impl fmt::Debug for Marshaler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Marshaler")
			.field("catalogue", &self.catalogue)
			.field("wait_timeout", &self.wait_timeout)
			.finish_non_exhaustive()
	}
}

/// `MarshalerBuilder` holds the settings of a [`Marshaler`].
#[derive(Debug, Clone)]
pub struct MarshalerBuilder {
	catalogue: Catalogue,
	wait_timeout: Duration,
}

impl Default for MarshalerBuilder {
	fn default() -> Self {
		Self {
			catalogue: Catalogue::new(),
			wait_timeout: DEFAULT_WAIT_TIMEOUT,
		}
	}
}

impl MarshalerBuilder {
	/// Creates a new `MarshalerBuilder` with default values:
	/// - `wait_timeout`: 10 minutes
	/// - catalogue: the built-in property identifiers only
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Upper bound on the time [`Marshaler::wait_async`] waits for a job to complete
	#[must_use]
	pub const fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
		self.wait_timeout = wait_timeout;
		self
	}

	/// Declares the kind of a property identifier the built-in catalogue doesn't know, or
	/// overrides a built-in declaration
	#[must_use]
	pub fn declare(mut self, id: PropertyId, kind: PropertyKind) -> Self {
		self.catalogue.declare(id, kind);
		self
	}

	/// Builds a `Marshaler` over `engine`
	#[must_use]
	pub fn build(self, engine: Arc<dyn Engine>) -> Marshaler {
		Marshaler {
			engine,
			catalogue: Arc::new(self.catalogue),
			wait_timeout: self.wait_timeout,
		}
	}
}
