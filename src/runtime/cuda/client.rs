//! Per-device context and stream cache

use super::device::CudaDevice;
use crate::error::Result;
use cudarc::driver::safe::{CudaContext, CudaStream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Context and launch stream for one device
#[derive(Clone)]
pub(super) struct CudaClient {
    pub(super) context: Arc<CudaContext>,
    pub(super) stream: Arc<CudaStream>,
}

impl CudaClient {
    fn new(device: &CudaDevice) -> Result<Self> {
        let context = CudaContext::new(device.index)?;
        let stream = context.new_stream()?;
        log::debug!("created CUDA context and stream for device {}", device.index);
        Ok(Self { context, stream })
    }
}

static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, CudaClient>>> = OnceLock::new();

/// Get or create the cached client for a device, bound to the calling thread
pub(super) fn client_for(device: &CudaDevice) -> Result<CudaClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let client = {
        let mut guard = cache.lock();
        match guard.get(&device.index) {
            Some(client) => client.clone(),
            None => {
                let client = CudaClient::new(device)?;
                guard.insert(device.index, client.clone());
                client
            }
        }
    };
    client.context.bind_to_thread()?;
    Ok(client)
}

/// Cached client for a device, if one was ever created
pub(super) fn cached_client(device_index: usize) -> Option<CudaClient> {
    CLIENT_CACHE.get()?.lock().get(&device_index).cloned()
}
