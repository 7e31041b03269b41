//! Per-device memoization of compiled kernels

use super::args::ArgInfo;
use super::codegen::KernelTemplate;
use super::types::TypeSignature;
use crate::error::Result;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Cache Key
// ============================================================================

/// Everything a synthesized kernel's source depends on
///
/// Two calls with equal signatures produce byte-identical source and share
/// one compiled kernel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArgumentSignature {
    /// Ordinal of the device the kernel is loaded on
    pub device_id: usize,
    /// Kind, element type and rank of every marshalled argument, indexer last
    pub args: Vec<ArgInfo>,
    /// Resolved input and output types
    pub types: TypeSignature,
    /// The operation's construction-time description
    pub template: Arc<KernelTemplate>,
}

// ============================================================================
// Compilation Cache
// ============================================================================

type Slot<K> = Mutex<Option<Arc<K>>>;

/// Snapshot of cache counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served by an already compiled kernel
    pub hits: u64,
    /// Lookups that had to compile
    pub misses: u64,
    /// Successful compilations
    pub compiles: u64,
    /// Number of keys with a slot
    pub entries: usize,
}

/// Compiled kernels keyed by [`ArgumentSignature`]
///
/// The map lock is held only long enough to find or create a key's slot.
/// The slot lock is held across synthesis and compilation, so concurrent
/// callers with the same key wait for one compilation and then share its
/// result. A failed compilation leaves the slot empty.
pub struct CompilationCache<R: Runtime> {
    slots: Mutex<HashMap<ArgumentSignature, Arc<Slot<R::Kernel>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
}

impl<R: Runtime> CompilationCache<R> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    /// Return the kernel for `sig`, running `compile` if none is cached yet
    pub fn get_or_compile<F>(&self, sig: &ArgumentSignature, compile: F) -> Result<Arc<R::Kernel>>
    where
        F: FnOnce() -> Result<R::Kernel>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            match slots.get(sig) {
                Some(slot) => slot.clone(),
                None => {
                    let slot = Arc::new(Mutex::new(None));
                    slots.insert(sig.clone(), slot.clone());
                    slot
                }
            }
        };

        let mut entry = slot.lock();
        if let Some(kernel) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "kernel cache hit: '{}' on device {}",
                sig.template.name,
                sig.device_id
            );
            return Ok(kernel.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "kernel cache miss: '{}' on device {} ({} args)",
            sig.template.name,
            sig.device_id,
            sig.args.len()
        );

        let kernel = Arc::new(compile()?);
        self.compiles.fetch_add(1, Ordering::Relaxed);
        *entry = Some(kernel.clone());
        Ok(kernel)
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Zero the counters without dropping kernels
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.compiles.store(0, Ordering::Relaxed);
    }

    /// Number of keys with a slot
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if nothing has been cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every successfully compiled kernel, in no particular order
    pub fn kernels(&self) -> Vec<Arc<R::Kernel>> {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }

    /// Drop every cached kernel
    pub fn clear(&self) {
        let dropped = {
            let mut slots = self.slots.lock();
            std::mem::take(&mut *slots)
        };
        if !dropped.is_empty() {
            log::debug!("cleared {} {} kernel cache entries", dropped.len(), R::name());
        }
    }
}

impl<R: Runtime> Default for CompilationCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> std::fmt::Debug for CompilationCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationCache")
            .field("runtime", &R::name())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::error::Error;
    use crate::kernel::codegen::{KernelSource, TypedefStyle};
    use crate::kernel::param::ParamInfo;
    use crate::runtime::cpu::{CpuRuntime, HostFrame, HostKernel, register_host_routine};
    use crate::runtime::{Device, cpu::CpuDevice};
    use std::sync::atomic::AtomicUsize;

    const ROUTINE: &str = "cache_test_noop";

    fn signature(device_id: usize, dtype: DType) -> ArgumentSignature {
        ArgumentSignature {
            device_id,
            args: vec![ArgInfo::array(dtype, 1), ArgInfo::indexer(1)],
            types: TypeSignature {
                in_types: vec![dtype],
                out_types: Vec::new(),
                bindings: vec![('T', dtype)],
            },
            template: Arc::new(KernelTemplate {
                name: ROUTINE.to_string(),
                params: vec![ParamInfo::indexer()].into(),
                nin: 0,
                operation: String::new(),
                preamble: String::new(),
                loop_prep: String::new(),
                after_loop: String::new(),
                options: Vec::new(),
                style: TypedefStyle::Tags,
            }),
        }
    }

    fn compile(device: usize) -> Result<HostKernel> {
        register_host_routine(ROUTINE, |_: &mut HostFrame<'_>| Ok(()));
        let source = KernelSource {
            name: ROUTINE.to_string(),
            code: String::new(),
            options: Vec::new(),
        };
        CpuRuntime::compile(&source, &CpuDevice::with_index(device))
    }

    #[test]
    fn test_hit_returns_same_kernel() {
        let cache = CompilationCache::<CpuRuntime>::new();
        let sig = signature(0, DType::F32);
        let a = cache.get_or_compile(&sig, || compile(0)).unwrap();
        let b = cache
            .get_or_compile(&sig, || panic!("must not recompile"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.compiles), (1, 1, 1));
    }

    #[test]
    fn test_keys_differ_by_device_and_type() {
        let cache = CompilationCache::<CpuRuntime>::new();
        let a = cache.get_or_compile(&signature(0, DType::F32), || compile(0)).unwrap();
        let b = cache.get_or_compile(&signature(1, DType::F32), || compile(1)).unwrap();
        let c = cache.get_or_compile(&signature(0, DType::F64), || compile(0)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 3);
        assert_eq!(CpuDevice::with_index(1).id(), 1);
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let cache = CompilationCache::<CpuRuntime>::new();
        let sig = signature(0, DType::I8);
        let err = cache
            .get_or_compile(&sig, || Err(Error::compile(ROUTINE, "rejected")))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Compile { .. }));
        cache.get_or_compile(&sig, || compile(0)).unwrap();
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().compiles, 1);
    }

    #[test]
    fn test_concurrent_lookups_compile_once() {
        let cache = Arc::new(CompilationCache::<CpuRuntime>::new());
        let compiles = Arc::new(AtomicUsize::new(0));
        let sig = signature(0, DType::U16);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let compiles = compiles.clone();
                let sig = sig.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_compile(&sig, || {
                            compiles.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            compile(0)
                        })
                        .unwrap()
                })
            })
            .collect();

        let kernels: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert!(kernels.iter().all(|k| Arc::ptr_eq(k, &kernels[0])));
    }

    #[test]
    fn test_clear() {
        let cache = CompilationCache::<CpuRuntime>::new();
        let sig = signature(0, DType::Bool);
        let kept = cache.get_or_compile(&sig, || compile(0)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        let fresh = cache.get_or_compile(&sig, || compile(0)).unwrap();
        assert!(!Arc::ptr_eq(&kept, &fresh));
    }
}
