use crate::{
	error::Error,
	property::Handle,
	record::{FieldSpec, ResultRecord},
	Marshaler,
};

use tokio::{task::spawn_blocking, time::timeout};
use tracing::{debug, instrument, warn};

impl Marshaler {
	/// Blocks until `job` completes, then decodes every field of `spec` from it in order.
	///
	/// Either every field decodes or the call fails as a whole. A failed job yields
	/// [`Error::JobFailed`] and nothing is decoded. An empty `spec` only waits.
	#[instrument(skip(self, spec), fields(fields = spec.len()), err)]
	pub fn wait(&self, job: Handle, spec: &FieldSpec) -> Result<ResultRecord, Error> {
		spec.validate(self.catalogue(), job)?;

		let status = self.engine().wait(job);
		if !status.is_ok() {
			return Err(Error::job_failed(&**self.engine(), job, status));
		}

		debug!("Job completed");

		self.read_unchecked(job, spec)
	}

	/// [`Marshaler::wait`] on a blocking worker, giving up after the configured wait timeout.
	///
	/// Giving up doesn't cancel the native wait, the worker keeps blocking until the job
	/// completes and its result is dropped.
	pub async fn wait_async(&self, job: Handle, spec: FieldSpec) -> Result<ResultRecord, Error> {
		let marshaler = self.clone();
		let wait_timeout = self.wait_timeout();

		match timeout(wait_timeout, spawn_blocking(move || marshaler.wait(job, &spec))).await {
			Ok(res) => res?,
			Err(_) => {
				warn!(%job, ?wait_timeout, "Gave up waiting for job");
				Err(Error::Timeout {
					handle: job,
					timeout: wait_timeout,
				})
			}
		}
	}
}
