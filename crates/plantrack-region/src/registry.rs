//! Process-wide registry of named regions.
//!
//! Mirrors a named-shared-segment registry: `attach_named` either hands back
//! the already-published region or runs the caller's initializer while still
//! holding the registration lock, so exactly one attacher ever initializes a
//! given name and nobody observes a half-built region.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use plantrack_core::error::{Error, Result};

type AnyRegion = Arc<dyn Any + Send + Sync>;

static REGISTRY: Lazy<Mutex<HashMap<String, AnyRegion>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Attach to the region `name`, creating it with `init` if this call is the
/// first. Returns the region and whether this call created it.
///
/// `init` failing leaves the name unregistered, so a later attach retries
/// initialization from scratch.
pub fn attach_named<R, F>(name: &str, init: F) -> Result<(Arc<R>, bool)>
where
    R: Send + Sync + 'static,
    F: FnOnce() -> Result<R>,
{
    let mut registry = REGISTRY.lock();

    if let Some(existing) = registry.get(name) {
        let region = Arc::clone(existing).downcast::<R>().map_err(|_| {
            Error::Corruption(format!(
                "shared region \"{name}\" is registered with a different payload type"
            ))
        })?;
        debug!(region = name, "attached to existing shared region");
        return Ok((region, false));
    }

    let region = Arc::new(init()?);
    registry.insert(name.to_string(), Arc::clone(&region) as AnyRegion);
    debug!(region = name, "created shared region");
    Ok((region, true))
}
