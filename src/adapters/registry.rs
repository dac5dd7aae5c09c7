//! Builds the repair loop's collaborators from configuration.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, SelfCheckMode};
use crate::domain::ports::{Generator, ModelClient, Refiner, SelfCheck};
use crate::services::apply_orchestrator::build_spec;
use crate::services::content_store::ContentStore;
use crate::services::generator_chain::GeneratorChain;
use crate::services::repair_loop::RepairComponents;

use super::build::CommandBuildRunner;
use super::generators::{ModelGenerator, TemplateGenerator};
use super::models::{CommandModelClient, HttpModelClient};
use super::refiner::{BuildSelfCheck, ModelRefiner, ModelSelfCheck};
use super::state::JsonStateRepository;
use super::vcs::GitCli;

pub const TEMPLATE: &str = "template";
pub const LOCAL_MODEL: &str = "local_model";
pub const REMOTE_ADVISOR: &str = "remote_advisor";

/// Backend names accepted in `generators.order` and `verifier.refiner`.
pub const BACKENDS: &[&str] = &[TEMPLATE, LOCAL_MODEL, REMOTE_ADVISOR];

/// Configured model clients by backend name.
pub struct ModelRegistry {
    local: Option<Arc<dyn ModelClient>>,
    remote: Option<Arc<dyn ModelClient>>,
}

impl ModelRegistry {
    pub fn from_config(config: &Config, root: &Path) -> DomainResult<Self> {
        let local = config.generators.local_model.as_ref().map(|local| {
            Arc::new(CommandModelClient::new(LOCAL_MODEL, local, root)) as Arc<dyn ModelClient>
        });
        let remote = match &config.generators.remote_advisor {
            Some(remote) => Some(Arc::new(HttpModelClient::new(REMOTE_ADVISOR, remote)?) as Arc<dyn ModelClient>),
            None => None,
        };
        Ok(Self { local, remote })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelClient>> {
        match name {
            LOCAL_MODEL => self.local.clone(),
            REMOTE_ADVISOR => self.remote.clone(),
            _ => None,
        }
    }

    /// The named client, or the first configured model in generator order.
    pub fn refiner_client(&self, config: &Config) -> Option<Arc<dyn ModelClient>> {
        if let Some(name) = &config.verifier.refiner {
            return self.get(name);
        }
        config.generators.order.iter().find_map(|name| self.get(name))
    }
}

/// Generators in configured priority order.
pub fn build_generator_chain(config: &Config, models: &ModelRegistry, store: &ContentStore) -> DomainResult<GeneratorChain> {
    let mut chain = GeneratorChain::default();
    for name in &config.generators.order {
        let backend: Arc<dyn Generator> = match name.as_str() {
            TEMPLATE => Arc::new(TemplateGenerator::new(
                config.generators.templates.clone(),
                config.generators.template_confidence,
            )),
            LOCAL_MODEL | REMOTE_ADVISOR => match models.get(name) {
                Some(client) => Arc::new(ModelGenerator::new(name.clone(), client, store.clone())),
                None => {
                    info!(backend = %name, "backend not configured; skipping");
                    continue;
                }
            },
            other => {
                return Err(DomainError::ValidationFailed(format!("unknown generator backend: {other}")));
            }
        };
        chain.push(backend);
    }
    info!(backends = ?chain.names(), "generator chain ready");
    Ok(chain)
}

/// Production collaborators rooted at `root`.
pub fn build_components(config: &Config, root: &Path) -> DomainResult<RepairComponents> {
    let store = ContentStore::new(root);
    let models = ModelRegistry::from_config(config, root)?;
    let runner = Arc::new(CommandBuildRunner::new());
    let generator = Arc::new(build_generator_chain(config, &models, &store)?);

    let refiner_client = models.refiner_client(config);
    let refiner = refiner_client
        .clone()
        .map(|client| Arc::new(ModelRefiner::new(client)) as Arc<dyn Refiner>);

    let build_check = || -> Arc<dyn SelfCheck> {
        Arc::new(
            BuildSelfCheck::new(store.clone(), runner.clone(), build_spec(&config.build, root))
                .with_dry_run(config.dry_run),
        )
    };
    let checker = match (config.verifier.self_check, refiner_client) {
        (SelfCheckMode::Model, Some(client)) => Arc::new(ModelSelfCheck::new(client)) as Arc<dyn SelfCheck>,
        (SelfCheckMode::Model, None) => {
            warn!("model self-check requested but no model is configured; checking by build");
            build_check()
        }
        (SelfCheckMode::Build, _) => build_check(),
    };

    Ok(RepairComponents {
        generator,
        refiner,
        checker,
        vcs: Arc::new(GitCli::new(root, &config.vcs)),
        runner,
        state: Arc::new(JsonStateRepository::new(root.join(&config.state_dir))),
    })
}
