//! Async relationship resolution with single in-flight fetch per relationship.
//!
//! # Responsibility
//! - Decide whether reading an async relationship needs adapter work.
//! - Start at most one adapter fetch per relationship and attach later
//!   readers to it.
//! - Apply settled results in one edit and resume every waiter.
//!
//! # Invariants
//! - A failed fetch leaves canonical state unchanged and does not mark the
//!   relationship loaded, so the next read retries.
//! - A successful fetch marks the relationship loaded; it is never refetched.
//! - A result is dropped unless the owner's relationship still awaits that
//!   fetch id, so a record unloaded and pushed again ignores the old fetch.
//! - Only link fetches replace canonical membership. Related-record fetches
//!   load the referenced records and leave membership as it was.

use crate::adapter::{AdapterError, AdapterResult, LinkPayload};
use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleEvent, LifecycleState};
use crate::payload::EntityPayload;
use crate::relationship::resolution::{
    FetchError, FetchId, FromRelated, RelatedValue, RelationshipHandle,
};
use crate::schema::definition::RelationshipKind;
use crate::schema::ResolvedRelationship;
use crate::store::{Store, StoreError, StoreResult};
use futures::channel::oneshot;
use futures::future::{self, join_all, LocalBoxFuture};
use futures::FutureExt;
use log::{debug, info, warn};

/// One adapter fetch awaiting `Store::settle`.
pub(crate) struct InFlightFetch {
    ticket: FetchTicket,
    future: LocalBoxFuture<'static, AdapterResult<LinkPayload>>,
}

struct FetchTicket {
    id: FetchId,
    owner: RecordKey,
    field: String,
    source: FetchSource,
    /// Members moved to `loading` for this fetch.
    stubs: Vec<RecordKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchSource {
    Link,
    Related,
}

impl FetchSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Related => "related",
        }
    }
}

enum FetchPlan {
    Ready,
    Join,
    ByLink(String),
    Related(Vec<RecordKey>),
}

impl Store {
    /// Reads an async-capable belongs-to field, fetching it when needed.
    ///
    /// The handle is ready immediately for sync, loaded or locally edited
    /// relationships; otherwise it completes after `settle`.
    pub fn request_belongs_to(
        &mut self,
        owner: &RecordKey,
        field: &str,
    ) -> StoreResult<RelationshipHandle<Option<RecordKey>>> {
        self.request_related(owner, field, RelationshipKind::BelongsTo)
    }

    /// Reads an async-capable has-many field, fetching it when needed.
    pub fn request_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
    ) -> StoreResult<RelationshipHandle<Vec<RecordKey>>> {
        self.request_related(owner, field, RelationshipKind::HasMany)
    }

    /// Requests, settles and awaits a belongs-to value.
    pub async fn load_belongs_to(
        &mut self,
        owner: &RecordKey,
        field: &str,
    ) -> StoreResult<Option<RecordKey>> {
        let handle = self.request_belongs_to(owner, field)?;
        if handle.is_pending() {
            self.settle().await;
        }
        Ok(handle.await?)
    }

    /// Requests, settles and awaits has-many members.
    pub async fn load_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
    ) -> StoreResult<Vec<RecordKey>> {
        let handle = self.request_has_many(owner, field)?;
        if handle.is_pending() {
            self.settle().await;
        }
        Ok(handle.await?)
    }

    /// Number of adapter fetches started but not yet settled.
    pub fn pending_fetches(&self) -> usize {
        self.in_flight.len()
    }

    /// Drives every in-flight fetch to completion and applies the results
    /// in one edit. Returns the number of fetches settled.
    pub async fn settle(&mut self) -> usize {
        let in_flight = std::mem::take(&mut self.in_flight);
        if in_flight.is_empty() {
            return 0;
        }
        let mut tickets = Vec::with_capacity(in_flight.len());
        let mut futures = Vec::with_capacity(in_flight.len());
        for fetch in in_flight {
            tickets.push(fetch.ticket);
            futures.push(fetch.future);
        }

        let outcomes = join_all(futures).await;
        let settled = outcomes.len();
        self.in_edit(|store| {
            for (ticket, outcome) in tickets.into_iter().zip(outcomes) {
                store.complete_fetch(ticket, outcome);
            }
        });
        debug!("event=fetch_settle module=store status=ok fetches={settled}");
        settled
    }

    fn request_related<T: FromRelated>(
        &mut self,
        owner: &RecordKey,
        field: &str,
        kind: RelationshipKind,
    ) -> StoreResult<RelationshipHandle<T>> {
        let def = self.relationship_def_of_kind(&owner.model, field, kind)?;
        let state = self
            .peek_record(owner)
            .ok_or_else(|| StoreError::RecordNotFound(owner.clone()))?
            .state();
        if state == LifecycleState::DeletedSaved {
            return Err(StoreError::RecordDeleted(owner.clone()));
        }

        let (source, stubs, future) = match self.plan_fetch(owner, &def) {
            FetchPlan::Ready => {
                let value = self.related_value(owner, &def);
                return Ok(RelationshipHandle::ready(T::from_related(value)?));
            }
            FetchPlan::Join => {
                let (waiter, receiver) = oneshot::channel();
                let joined = self
                    .records
                    .get_mut(owner)
                    .and_then(|record| record.relationship_mut(field))
                    .is_some_and(|rel| rel.meta_mut().fetch.join(waiter));
                if !joined {
                    return Err(StoreError::Fetch(FetchError::Cancelled));
                }
                debug!("event=fetch_join module=store status=ok key={owner} field={field}");
                return Ok(RelationshipHandle::waiting(receiver));
            }
            FetchPlan::ByLink(link) => {
                let future = match &self.adapter {
                    Some(adapter) => adapter.fetch_by_link(&link),
                    None => missing_adapter(),
                };
                (FetchSource::Link, Vec::new(), future)
            }
            FetchPlan::Related(stubs) => {
                self.in_edit(|store| {
                    stubs
                        .iter()
                        .try_for_each(|stub| store.transition(stub, LifecycleEvent::LoadStarted))
                })?;
                let future = match (&self.adapter, kind) {
                    (Some(adapter), RelationshipKind::BelongsTo) => adapter
                        .fetch_related_record(owner, field)
                        .map(|result| result.map(LinkPayload::One))
                        .boxed_local(),
                    (Some(adapter), RelationshipKind::HasMany) => adapter
                        .fetch_related_records(owner, field)
                        .map(|result| result.map(LinkPayload::Many))
                        .boxed_local(),
                    (None, _) => missing_adapter(),
                };
                (FetchSource::Related, stubs, future)
            }
        };

        self.next_fetch_id += 1;
        let id = self.next_fetch_id;
        info!(
            "event=fetch_start module=store status=ok key={owner} field={field} fetch={id} via={} stubs={}",
            source.as_str(),
            stubs.len()
        );
        let (waiter, receiver) = oneshot::channel();
        if let Some(record) = self.records.get_mut(owner) {
            record
                .relationship_or_insert(&def)
                .meta_mut()
                .fetch
                .begin(id, waiter);
        }
        self.in_flight.push(InFlightFetch {
            ticket: FetchTicket {
                id,
                owner: owner.clone(),
                field: field.to_string(),
                source,
                stubs,
            },
            future,
        });
        Ok(RelationshipHandle::waiting(receiver))
    }

    fn plan_fetch(&mut self, owner: &RecordKey, def: &ResolvedRelationship) -> FetchPlan {
        if !def.is_async {
            return FetchPlan::Ready;
        }
        let Some(record) = self.records.get_mut(owner) else {
            return FetchPlan::Ready;
        };
        let rel = record.relationship_or_insert(def);
        if rel.meta().has_loaded() || rel.is_dirty() {
            return FetchPlan::Ready;
        }
        if rel.meta().is_fetch_pending() {
            return FetchPlan::Join;
        }
        if let Some(link) = rel.meta().link() {
            return FetchPlan::ByLink(link.to_string());
        }
        let members = rel.referenced();
        let stubs: Vec<RecordKey> = members
            .into_iter()
            .filter(|member| {
                self.records
                    .get(member)
                    .is_some_and(|record| record.state().is_empty())
            })
            .collect();
        if stubs.is_empty() {
            FetchPlan::Ready
        } else {
            FetchPlan::Related(stubs)
        }
    }

    /// Current value of a relationship as handed to readers.
    pub(crate) fn related_value(&self, owner: &RecordKey, def: &ResolvedRelationship) -> RelatedValue {
        let rel = self
            .records
            .get(owner)
            .and_then(|record| record.relationship(&def.name));
        match def.kind {
            RelationshipKind::BelongsTo => RelatedValue::One(
                rel.and_then(|rel| rel.as_belongs_to())
                    .and_then(|rel| rel.current().cloned()),
            ),
            RelationshipKind::HasMany => {
                let members = rel
                    .and_then(|rel| rel.as_has_many())
                    .map(|rel| rel.current())
                    .unwrap_or_default();
                RelatedValue::Many(self.visible_members(members))
            }
        }
    }

    fn complete_fetch(&mut self, ticket: FetchTicket, outcome: AdapterResult<LinkPayload>) {
        let FetchTicket {
            id,
            owner,
            field,
            source,
            stubs,
        } = ticket;
        let owner = &owner;
        let field = field.as_str();
        let issued_here = self
            .peek_record(owner)
            .and_then(|record| record.relationship(field))
            .is_some_and(|rel| rel.meta().fetch.awaits(id));
        let def = match self.relationship_def(&owner.model, field) {
            Ok(def) if issued_here => def,
            _ => {
                self.reset_stubs(&stubs);
                warn!("event=fetch_complete module=store status=cancelled key={owner} field={field} fetch={id}");
                return;
            }
        };

        let result = outcome
            .map_err(|err: AdapterError| FetchError::Adapter(err.message().to_string()))
            .and_then(|payload| self.validate_fetched(owner, &def, payload));

        match result {
            Ok(FetchedData { entities, value }) => {
                for entity in entities {
                    self.apply_entity(entity);
                }
                match (source, value) {
                    (FetchSource::Link, RelatedKeys::One(target)) => {
                        self.push_belongs_to(owner, &def, target)
                    }
                    (FetchSource::Link, RelatedKeys::Many(members)) => {
                        self.push_has_many(owner, &def, members)
                    }
                    (FetchSource::Related, _) => {}
                }
                self.reset_stubs(&stubs);
                let value = self.related_value(owner, &def);
                let waiters = match self
                    .records
                    .get_mut(owner)
                    .and_then(|record| record.relationship_mut(field))
                {
                    Some(rel) => {
                        let meta = rel.meta_mut();
                        meta.has_loaded = true;
                        meta.fetch.take_waiters()
                    }
                    None => Vec::new(),
                };
                info!(
                    "event=fetch_complete module=store status=ok key={owner} field={field} fetch={id} waiters={}",
                    waiters.len()
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(value.clone()));
                }
            }
            Err(err) => {
                self.reset_stubs(&stubs);
                let waiters = self
                    .records
                    .get_mut(owner)
                    .and_then(|record| record.relationship_mut(field))
                    .map(|rel| rel.meta_mut().fetch.take_waiters())
                    .unwrap_or_default();
                warn!(
                    "event=fetch_complete module=store status=error key={owner} field={field} fetch={id} waiters={} error={err}",
                    waiters.len()
                );
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    /// Returns stubs still `loading` to `empty`.
    fn reset_stubs(&mut self, stubs: &[RecordKey]) {
        for stub in stubs {
            let loading = self
                .peek_record(stub)
                .is_some_and(|record| record.state() == LifecycleState::Loading);
            if loading {
                let _ = self.transition(stub, LifecycleEvent::LoadFailed);
            }
        }
    }

    fn validate_fetched(
        &self,
        owner: &RecordKey,
        def: &ResolvedRelationship,
        payload: LinkPayload,
    ) -> Result<FetchedData, FetchError> {
        let (entities, value) = match (payload, def.kind) {
            (LinkPayload::One(entity), RelationshipKind::BelongsTo) => {
                let target = entity.as_ref().map(EntityPayload::key);
                (entity.into_iter().collect::<Vec<_>>(), RelatedKeys::One(target))
            }
            (LinkPayload::Many(entities), RelationshipKind::HasMany) => {
                let members = entities.iter().map(EntityPayload::key).collect();
                (entities, RelatedKeys::Many(members))
            }
            (_, kind) => {
                return Err(FetchError::InvalidPayload(format!(
                    "`{}.{}` expects {} data",
                    owner.model,
                    def.name,
                    kind.as_str()
                )))
            }
        };
        for entity in &entities {
            if entity.model != def.target {
                return Err(FetchError::InvalidPayload(format!(
                    "`{}.{}` expects `{}` records, got `{}`",
                    owner.model, def.name, def.target, entity.model
                )));
            }
            self.validate_entity(entity)
                .map_err(|err| FetchError::InvalidPayload(err.to_string()))?;
        }
        Ok(FetchedData { entities, value })
    }
}

struct FetchedData {
    entities: Vec<EntityPayload>,
    value: RelatedKeys,
}

enum RelatedKeys {
    One(Option<RecordKey>),
    Many(Vec<RecordKey>),
}

fn missing_adapter() -> LocalBoxFuture<'static, AdapterResult<LinkPayload>> {
    future::ready(Err(AdapterError::new("no adapter configured"))).boxed_local()
}
