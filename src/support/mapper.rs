use crate::core::Result;
use crate::session::{SessionFactory, SessionTemplate};
use crate::transaction::TransactionRegistry;
use log::debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed statement interface bound to a template.
///
/// `NAMESPACE` is the statement prefix the mapper's statements live under;
/// it has to be registered in the `Configuration` before `bind` is used.
pub trait Mapper: Sized {
    const NAMESPACE: &'static str;

    fn bind(template: Arc<SessionTemplate>) -> Self;
}

/// Hands out mappers of one type, registering the namespace on demand.
pub struct MapperFactory<M: Mapper> {
    template: Arc<SessionTemplate>,
    add_to_config: bool,
    _mapper: PhantomData<fn() -> M>,
}

impl<M: Mapper> MapperFactory<M> {
    pub fn new(template: Arc<SessionTemplate>) -> Self {
        Self {
            template,
            add_to_config: true,
            _mapper: PhantomData,
        }
    }

    pub fn from_factory(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<dyn TransactionRegistry>,
    ) -> Self {
        Self::new(Arc::new(SessionTemplate::new(factory, registry)))
    }

    /// Register the namespace in `check_config` if it is missing
    pub fn add_to_config(mut self, add: bool) -> Self {
        self.add_to_config = add;
        self
    }

    pub fn check_config(&self) -> Result<()> {
        let config = self.template.configuration();
        if self.add_to_config && !config.has_mapper(M::NAMESPACE) {
            debug!("Registering mapper namespace {}", M::NAMESPACE);
            config
                .add_mapper(M::NAMESPACE)
                .map_err(|e| e.context(format!("Error while adding the mapper '{}' to configuration", M::NAMESPACE)))?;
        }
        Ok(())
    }

    pub fn object(&self) -> Result<M> {
        self.template.mapper::<M>()
    }

    pub fn namespace(&self) -> &'static str {
        M::NAMESPACE
    }

    pub fn template(&self) -> &Arc<SessionTemplate> {
        &self.template
    }
}
