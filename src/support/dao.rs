use crate::core::{Error, Result};
use crate::session::{SessionFactory, SessionTemplate};
use crate::transaction::TransactionRegistry;
use std::sync::Arc;

/// Base for DAOs that talk to the database through a `SessionTemplate`.
#[derive(Debug, Default)]
pub struct SessionDaoSupport {
    template: Option<Arc<SessionTemplate>>,
}

impl SessionDaoSupport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a template for `factory`, unless the current one already uses it
    pub fn set_session_factory(
        &mut self,
        factory: Arc<dyn SessionFactory>,
        registry: Arc<dyn TransactionRegistry>,
    ) {
        let same_factory = self
            .template
            .as_ref()
            .is_some_and(|template| template.session_factory().key() == factory.key());
        if !same_factory {
            self.template = Some(Arc::new(SessionTemplate::new(factory, registry)));
        }
    }

    pub fn set_session_template(&mut self, template: Arc<SessionTemplate>) {
        self.template = Some(template);
    }

    pub fn session_factory(&self) -> Option<&Arc<dyn SessionFactory>> {
        self.template.as_ref().map(|template| template.session_factory())
    }

    pub fn session(&self) -> Result<&Arc<SessionTemplate>> {
        self.template.as_ref().ok_or_else(missing_template)
    }

    pub fn check_config(&self) -> Result<()> {
        self.session().map(|_| ())
    }
}

fn missing_template() -> Error {
    Error::InvalidArgument("Property 'session_factory' or 'session_template' is required".into())
}
