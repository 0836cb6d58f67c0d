use super::lock::IdentifierLocks;
use super::{AcquireError, AcquireOptions, Acquired};
use crate::catalog_store::{CatalogStore, ExternalResource, Item, ResourceState};
use crate::config::{ApiKeys, ResolverSettings};
use crate::document::{NormalizedDocument, ResourceLink};
use crate::fetch::{download_image, FetchContext};
use crate::identity::{absorb_document, IdentityResolver};
use crate::metrics;
use crate::sites::{DependencyResolver, IdType, ResolvedSite, ScrapeContext, Site, SiteRegistry, SiteTarget};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

type TrailKey = (IdType, String);

fn trail_labels(trail: &[TrailKey]) -> Vec<String> {
    trail
        .iter()
        .map(|(t, v)| format!("{}:{}", t.to_db_str(), v))
        .collect()
}

/// Drives one acquisition from URL to ready resource and canonical item.
pub struct Acquirer {
    registry: Arc<SiteRegistry>,
    fetch: FetchContext,
    identity: IdentityResolver,
    settings: ResolverSettings,
    api_keys: ApiKeys,
    languages: Vec<String>,
    locks: IdentifierLocks,
}

/// Hands scrapers a way to acquire the resources they depend on, one level
/// deeper in the trail.
struct Dependencies<'a> {
    acquirer: &'a Acquirer,
    trail: Vec<TrailKey>,
    options: AcquireOptions,
    satisfied: Mutex<HashMap<TrailKey, ExternalResource>>,
}

impl DependencyResolver for Dependencies<'_> {
    fn require(&self, link: &ResourceLink) -> Result<ExternalResource, AcquireError> {
        let key = (link.id_type, link.id_value.clone());
        if let Some(resource) = self.satisfied.lock().unwrap().get(&key) {
            return Ok(resource.clone());
        }
        let resolved = self
            .acquirer
            .registry
            .resolve_link(link, &self.acquirer.fetch)?;
        let acquired = self
            .acquirer
            .acquire(resolved, self.options.clone(), &self.trail, false)?;
        self.satisfied
            .lock()
            .unwrap()
            .insert(key, acquired.resource.clone());
        Ok(acquired.resource)
    }
}

impl Acquirer {
    pub fn new(
        registry: Arc<SiteRegistry>,
        fetch: FetchContext,
        store: Arc<dyn CatalogStore>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            registry,
            fetch,
            identity: IdentityResolver::new(store, settings.merge_hop_limit),
            settings,
            api_keys: ApiKeys::default(),
            languages: Vec::new(),
            locks: IdentifierLocks::new(),
        }
    }

    pub fn with_api_keys(mut self, api_keys: ApiKeys) -> Self {
        self.api_keys = api_keys;
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        self.identity.store()
    }

    /// Resolves `url` to its site and makes the resource ready: stored
    /// content is reused unless `ignore_existing` is set, required resources
    /// are acquired first, and the item is matched or created last.
    pub fn get_resource_ready(
        &self,
        url: &str,
        options: AcquireOptions,
    ) -> Result<Acquired, AcquireError> {
        let resolved = self.registry.resolve(url, &self.fetch).map_err(|err| {
            error!(url, "Unresolvable URL: {}", err);
            AcquireError::from(err)
        })?;
        self.acquire(resolved, options.normalized(), &[], true)
    }

    pub fn get_resource_ready_by_id(
        &self,
        id_type: IdType,
        id_value: &str,
        options: AcquireOptions,
    ) -> Result<Acquired, AcquireError> {
        let resolved = self.registry.resolve_id(id_type, id_value)?;
        self.acquire(resolved, options.normalized(), &[], true)
    }

    fn acquire(
        &self,
        resolved: ResolvedSite,
        options: AcquireOptions,
        trail: &[TrailKey],
        crawl: bool,
    ) -> Result<Acquired, AcquireError> {
        let ResolvedSite { site, target } = resolved;
        let key = (target.id_type, target.id_value.clone());

        if trail.contains(&key) {
            let mut labels = trail_labels(trail);
            labels.push(format!("{}:{}", key.0.to_db_str(), key.1));
            error!(
                url = %target.url,
                id_type = %target.id_type,
                id_value = %target.id_value,
                hops = trail.len(),
                "Required resource cycle"
            );
            return Err(AcquireError::Cycle {
                id_type: target.id_type,
                id_value: target.id_value,
                trail: labels,
            });
        }
        if trail.len() > self.settings.max_required_depth {
            error!(
                url = %target.url,
                id_type = %target.id_type,
                id_value = %target.id_value,
                hops = trail.len(),
                "Required resources nested too deep"
            );
            return Err(AcquireError::DepthExceeded {
                id_type: target.id_type,
                id_value: target.id_value,
                limit: self.settings.max_required_depth,
            });
        }

        let result = match self.locks.lock(target.id_type, &target.id_value) {
            Ok(_guard) => self.acquire_locked(site.as_ref(), &target, options.clone(), trail),
            Err(cycle) => {
                let mut labels = trail_labels(trail);
                labels.extend(trail_labels(&cycle.chain));
                error!(
                    url = %target.url,
                    id_type = %target.id_type,
                    id_value = %target.id_value,
                    hops = labels.len(),
                    "Required resource cycle across concurrent acquisitions"
                );
                Err(AcquireError::Cycle {
                    id_type: target.id_type,
                    id_value: target.id_value.clone(),
                    trail: labels,
                })
            }
        };
        let id_type = target.id_type.to_db_str();
        let mut acquired = match result {
            Ok(acquired) => acquired,
            Err(err) => {
                metrics::record_acquisition(id_type, "failed");
                return Err(err);
            }
        };
        metrics::record_acquisition(id_type, if acquired.reused { "reused" } else { "ready" });

        if crawl && self.settings.crawl_related && !acquired.reused {
            if let Some(document) = &acquired.resource.document {
                self.crawl_related(document, &options);
                if let Some(item) = &acquired.item {
                    if self.crawl_prematched(document, item, &options) {
                        acquired.item = Some(self.identity.resolve(&item.id)?);
                    }
                }
            }
        }
        Ok(acquired)
    }

    fn acquire_locked(
        &self,
        site: &dyn Site,
        target: &SiteTarget,
        mut options: AcquireOptions,
        trail: &[TrailKey],
    ) -> Result<Acquired, AcquireError> {
        let store = self.store();
        let existing = store.get_resource(target.id_type, &target.id_value)?;

        if let Some(resource) = &existing {
            if resource.is_ready() && !options.ignore_existing && options.preloaded.is_none() {
                debug!(
                    id_type = %target.id_type,
                    id_value = %target.id_value,
                    "Reusing stored resource"
                );
                let mut resource = resource.clone();
                let item = if options.auto_create {
                    Some(self.item_for(&mut resource, false)?)
                } else {
                    match resource.item_id.as_deref() {
                        Some(id) => Some(self.identity.resolve(id)?),
                        None => None,
                    }
                };
                return Ok(Acquired {
                    resource,
                    item,
                    reused: true,
                });
            }
        }

        let mut resource = existing.unwrap_or_else(|| {
            ExternalResource::new(target.id_type, target.id_value.clone(), target.url.clone())
        });
        if let Err(err) = resource.state.transition(ResourceState::Fetching) {
            debug!("Restarting acquisition: {}", err);
        }
        resource.url = target.url.clone();
        resource.state = ResourceState::Fetching;
        resource.error = None;
        if options.auto_save {
            resource = store.upsert_resource(&resource)?;
        }

        let document = match self.scrape(site, target, &mut options, trail) {
            Ok(document) => document,
            Err(err) => {
                warn!(
                    url = %target.url,
                    id_type = %target.id_type,
                    id_value = %target.id_value,
                    "Acquisition failed: {}",
                    err
                );
                if options.auto_save {
                    store.set_resource_state(
                        target.id_type,
                        &target.id_value,
                        ResourceState::Failed,
                        Some(&err.to_string()),
                    )?;
                }
                return Err(err);
            }
        };

        let cover = document.header.cover.clone();
        resource.document = Some(document);
        resource.state = ResourceState::Ready;
        resource.scraped_at = Some(chrono::Utc::now().timestamp());
        if options.auto_save {
            let saved = store.upsert_resource(&resource)?;
            resource.id = saved.id;
            resource.item_id = saved.item_id;
        }

        let mut item = None;
        if options.auto_create {
            let mut created = self.item_for(&mut resource, true)?;
            if let Some(cover) = &cover {
                store.save_cover(&created.id, cover)?;
            }
            if options.auto_link {
                self.link_parent(&mut created, &resource)?;
            }
            item = Some(created);
        }
        info!(
            url = %target.url,
            id_type = %target.id_type,
            id_value = %target.id_value,
            "Resource ready"
        );
        Ok(Acquired {
            resource,
            item,
            reused: false,
        })
    }

    /// Scrapes (or takes the preloaded document), then acquires every
    /// required resource and downloads the cover.
    fn scrape(
        &self,
        site: &dyn Site,
        target: &SiteTarget,
        options: &mut AcquireOptions,
        trail: &[TrailKey],
    ) -> Result<NormalizedDocument, AcquireError> {
        let mut nested = trail.to_vec();
        nested.push((target.id_type, target.id_value.clone()));
        let dependencies = Dependencies {
            acquirer: self,
            trail: nested,
            options: options.for_dependency(),
            satisfied: Mutex::new(HashMap::new()),
        };
        let ctx = ScrapeContext {
            fetch: &self.fetch,
            registry: &self.registry,
            api_keys: &self.api_keys,
            languages: &self.languages,
            dependencies: &dependencies,
        };

        let mut document = match options.preloaded.take() {
            Some(document) => document,
            None => {
                let mut document = site.scrape(target, &ctx)?;
                if let Err(err) = site.scrape_additional(target, &mut document, &ctx) {
                    warn!(url = %target.url, "Additional data unavailable: {}", err);
                }
                document
            }
        };

        for link in &document.header.required_resources {
            dependencies.require(link)?;
        }

        if document.header.cover.is_none() {
            if let Some(url) = document.header.cover_image_url.clone() {
                document.header.cover = download_image(&self.fetch.image(None), &url);
            }
        }
        Ok(document)
    }

    /// The live item for `resource`, matching or creating one when the
    /// resource is not attached yet. `refresh` folds the resource's document
    /// into an already attached item.
    fn item_for(&self, resource: &mut ExternalResource, refresh: bool) -> Result<Item, AcquireError> {
        let store = self.store();
        let document = resource
            .document
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Resource {} has no content", resource.url))?;

        if let Some(item_id) = resource.item_id.as_deref() {
            let mut item = self.identity.resolve(item_id)?;
            if refresh {
                absorb_document(&mut item, document);
                store.update_item(&item)?;
            }
            if item.id != item_id {
                store.attach_resource(resource.id_type, &resource.id_value, &item.id)?;
                resource.item_id = Some(item.id.clone());
            }
            return Ok(item);
        }

        let matched = self.identity.match_or_create(document)?;
        store.attach_resource(resource.id_type, &resource.id_value, &matched.item.id)?;
        resource.item_id = Some(matched.item.id.clone());
        Ok(matched.item)
    }

    /// Links `item` under the item of its first attached required resource.
    fn link_parent(&self, item: &mut Item, resource: &ExternalResource) -> Result<(), AcquireError> {
        let Some(document) = &resource.document else {
            return Ok(());
        };
        for link in &document.header.required_resources {
            let Some(parent_resource) = self.store().get_resource(link.id_type, &link.id_value)? else {
                continue;
            };
            let Some(parent_id) = parent_resource.item_id else {
                continue;
            };
            let parent = self.identity.resolve(&parent_id)?;
            if parent.id != item.id && item.parent_id.as_deref() != Some(parent.id.as_str()) {
                info!("Linking {} \"{}\" under {}", item.kind, item.title, parent.id);
                item.parent_id = Some(parent.id);
                self.store().update_item(item)?;
            }
            break;
        }
        Ok(())
    }

    /// Best effort: failures are logged and skipped.
    fn crawl_related(&self, document: &NormalizedDocument, options: &AcquireOptions) {
        for link in &document.header.related_resources {
            let resolved = match self.registry.resolve_link(link, &self.fetch) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(url = %link.url, "Skipping related resource: {}", err);
                    continue;
                }
            };
            if let Err(err) = self.acquire(resolved, options.for_dependency(), &[], false) {
                warn!(url = %link.url, "Related resource failed: {}", err);
            }
        }
    }

    /// Best effort: acquires each prematched resource without creating an
    /// item for it and folds it into `item`. Returns true when `item` changed.
    fn crawl_prematched(
        &self,
        document: &NormalizedDocument,
        item: &Item,
        options: &AcquireOptions,
    ) -> bool {
        let options = AcquireOptions {
            auto_create: false,
            auto_link: false,
            ..options.for_dependency()
        };
        let mut changed = false;
        for link in &document.header.prematched_resources {
            let adopted = self
                .registry
                .resolve_link(link, &self.fetch)
                .map_err(AcquireError::from)
                .and_then(|resolved| self.acquire(resolved, options.clone(), &[], false))
                .and_then(|acquired| self.adopt_prematched(item, &acquired.resource));
            match adopted {
                Ok(adopted) => changed |= adopted,
                Err(err) => warn!(url = %link.url, "Prematched resource failed: {}", err),
            }
        }
        changed
    }

    /// Attaches a prematched resource to the live item of `item` unless it
    /// already belongs to another one, and merges its document in.
    fn adopt_prematched(&self, item: &Item, resource: &ExternalResource) -> Result<bool, AcquireError> {
        let Some(document) = &resource.document else {
            return Ok(false);
        };
        let mut target = self.identity.resolve(&item.id)?;
        match resource.item_id.as_deref() {
            None => {
                self.store()
                    .attach_resource(resource.id_type, &resource.id_value, &target.id)?;
            }
            Some(owner) => {
                let owner = self.identity.resolve(owner)?;
                if owner.id != target.id {
                    debug!(
                        id_type = %resource.id_type,
                        id_value = %resource.id_value,
                        "Prematched resource already belongs to {}",
                        owner.id
                    );
                    return Ok(false);
                }
            }
        }
        absorb_document(&mut target, document);
        self.store().update_item(&target)?;
        info!(
            id_type = %resource.id_type,
            id_value = %resource.id_value,
            "Prematched resource merged into {}",
            target.id
        );
        Ok(true)
    }
}
