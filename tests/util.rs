// This is almost certainly not all used in all tests.
#![allow(dead_code)]
use std::hash::Hasher;
use std::sync::{Mutex, MutexGuard};

use txkit::{Context, ErrorKind, Image};

static LAST_ERROR_LOCK: Mutex<()> = Mutex::new(());

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serialize tests that inspect the process-wide last error slot.
pub fn error_slot() -> MutexGuard<'static, ()> {
    LAST_ERROR_LOCK
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

/// A GPU context, or `None` on machines without a usable adapter.
///
/// Adapters that can not hold every image format are refused at context creation with an
/// `AllocationFailure`, those skip as well.
pub fn gpu_context() -> Option<Context> {
    init_logging();
    match Context::new_gpu() {
        Ok(ctx) => Some(ctx),
        Err(err) if err.kind() == ErrorKind::AllocationFailure => {
            eprintln!("Skipping GPU test: {}", err);
            None
        }
        Err(err) => panic!("GPU context creation failed: {}", err),
    }
}

/// A checksum over the dimensions and the data of an image.
pub fn image_crc(image: &mut Image) -> u64 {
    let dim = image.dim();
    let mut crc = crc32fast::Hasher::new();
    crc.write_usize(dim.width);
    crc.write_usize(dim.height);
    crc.write_usize(dim.depth);
    crc.write_usize(dim.channels);

    let view = image.map_read().expect("Image can be mapped for reading");
    match (view.as_f32(), view.as_u8()) {
        (Some(data), _) => data.iter().for_each(|v| crc.write_u32(v.to_bits())),
        (_, Some(data)) => crc.write(data),
        _ => unreachable!("Images hold exactly one element type"),
    }

    crc.finish()
}
