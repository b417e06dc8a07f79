use crate::context::Context;

/// Hook that attaches derived-metric definitions to a context.
///
/// `bind` runs once a context is published (and again on reconnect of
/// non-host contexts); `unbind` runs once before teardown. Both are called
/// with the context locked and must not call back into the registry.
pub trait DerivedMetricBinder: Send + Sync {
    fn bind(&self, context: &Context) -> Result<(), String>;

    fn unbind(&self, context: &Context);
}

/// Binder for clients without derived metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBinder;

impl DerivedMetricBinder for NoopBinder {
    fn bind(&self, _context: &Context) -> Result<(), String> {
        Ok(())
    }

    fn unbind(&self, _context: &Context) {}
}
