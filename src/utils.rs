use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info};

use crate::capture::caps::query_capabilities;
use crate::capture::DeviceHandle;

/// Auto-detect the first video capture node among `/dev/video0..9`.
pub fn find_capture_device() -> Result<String> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let device = match DeviceHandle::open(&path) {
            Ok(device) => device,
            Err(err) => {
                debug!("Skipping {}: {}", path, err);
                continue;
            }
        };

        match query_capabilities(&device) {
            Ok(caps) => {
                info!("Found capture device: {} - {}", path, caps.card);
                return Ok(path);
            }
            Err(err) => debug!("Skipping {}: {}", path, err),
        }
    }

    Err(eyre!("No suitable capture device found"))
}
