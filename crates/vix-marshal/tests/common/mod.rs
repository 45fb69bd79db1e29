use vix_marshal::{memory::MemoryValue, Engine, Handle, Marshaler, MemoryEngine, PropertyId};

use std::{sync::Arc, time::Duration};

pub fn setup() -> (Arc<MemoryEngine>, Marshaler) {
	let engine = Arc::new(MemoryEngine::new());
	let marshaler = Marshaler::builder()
		.wait_timeout(Duration::from_millis(100))
		.build(Arc::clone(&engine) as Arc<dyn Engine>);

	(engine, marshaler)
}

/// A directory listing job, one record per `(name, size, flags, modified)`.
pub fn file_listing(engine: &MemoryEngine, files: &[(&str, i64, i32, i64)]) -> Handle {
	files
		.iter()
		.fold(engine.job(), |job, &(name, size, flags, modified)| {
			job.record([
				(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from(name)),
				(PropertyId::JOB_RESULT_FILE_SIZE, MemoryValue::from(size)),
				(PropertyId::JOB_RESULT_FILE_FLAGS, MemoryValue::from(flags)),
				(PropertyId::JOB_RESULT_FILE_MOD_TIME, MemoryValue::from(modified)),
			])
		})
		.finish()
}

pub const FIVE_FILES: [(&str, i64, i32, i64); 5] = [
	("boot.ini", 211, 0, 1_690_000_000),
	("logs", 0, 1, 1_695_000_000),
	("pagefile.sys", 4096, 1, 1_700_000_000),
	("notes.txt", 12, 0, 1_701_000_000),
	("current", 0, 2, 1_702_000_000),
];
