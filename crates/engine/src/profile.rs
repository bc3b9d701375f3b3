//! Profile store: saved addresses and payment methods.
//!
//! Both collections share one contract through [`EntryCollection`]. When a
//! collection is non-empty exactly one entry carries the default flag, and
//! every change to the flag goes through a single promote step.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};

use marketstall_core::{
    Address, AddressId, AddressPatch, NewAddress, NewPaymentMethod, PaymentMethod,
    PaymentMethodId, PaymentMethodPatch, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CommerceError, EntityKind, Result, ValidationError};
use crate::storage::{Persistence, keys};

/// A saved record that can be the default of its collection.
pub trait ProfileEntry: Clone + Debug + Serialize + DeserializeOwned {
    type Id: Copy + Eq + Debug + Display + From<i32> + Into<i32>;
    type Draft;
    type Patch;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    fn is_default(&self) -> bool;

    fn set_default_flag(&mut self, is_default: bool);

    /// Build a record from a draft, validating its fields.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` if the draft is rejected.
    fn create(id: Self::Id, draft: Self::Draft) -> Result<Self>;

    fn draft_requests_default(draft: &Self::Draft) -> bool;

    /// Merge a patch without touching the default flag.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` if the patched fields are rejected;
    /// the record is left unchanged.
    fn apply(&mut self, patch: Self::Patch) -> Result<()>;

    fn patch_requests_default(patch: &Self::Patch) -> bool;
}

impl ProfileEntry for Address {
    type Id = AddressId;
    type Draft = NewAddress;
    type Patch = AddressPatch;

    const KIND: EntityKind = EntityKind::Address;

    fn id(&self) -> AddressId {
        self.id
    }

    fn is_default(&self) -> bool {
        self.is_default
    }

    fn set_default_flag(&mut self, is_default: bool) {
        self.is_default = is_default;
    }

    fn create(id: AddressId, draft: NewAddress) -> Result<Self> {
        Ok(Self::from_draft(id, draft))
    }

    fn draft_requests_default(draft: &NewAddress) -> bool {
        draft.is_default
    }

    fn apply(&mut self, patch: AddressPatch) -> Result<()> {
        Address::apply(self, patch);
        Ok(())
    }

    fn patch_requests_default(patch: &AddressPatch) -> bool {
        patch.is_default == Some(true)
    }
}

impl ProfileEntry for PaymentMethod {
    type Id = PaymentMethodId;
    type Draft = NewPaymentMethod;
    type Patch = PaymentMethodPatch;

    const KIND: EntityKind = EntityKind::PaymentMethod;

    fn id(&self) -> PaymentMethodId {
        self.id
    }

    fn is_default(&self) -> bool {
        self.is_default
    }

    fn set_default_flag(&mut self, is_default: bool) {
        self.is_default = is_default;
    }

    fn create(id: PaymentMethodId, draft: NewPaymentMethod) -> Result<Self> {
        draft
            .details
            .validate()
            .map_err(ValidationError::InvalidPaymentDetails)?;
        Ok(Self {
            id,
            details: draft.details,
            is_default: false,
        })
    }

    fn draft_requests_default(draft: &NewPaymentMethod) -> bool {
        draft.is_default
    }

    fn apply(&mut self, patch: PaymentMethodPatch) -> Result<()> {
        if let Some(details) = patch.details {
            details
                .validate()
                .map_err(ValidationError::InvalidPaymentDetails)?;
            self.details = details;
        }
        Ok(())
    }

    fn patch_requests_default(patch: &PaymentMethodPatch) -> bool {
        patch.is_default == Some(true)
    }
}

// =============================================================================
// EntryCollection
// =============================================================================

/// One persisted collection of profile entries.
#[derive(Debug)]
pub struct EntryCollection<T: ProfileEntry> {
    entries: Vec<T>,
    key: String,
    persistence: Persistence,
    /// `None` once every ID has been handed out.
    next_id: Option<i32>,
    applied_tokens: HashMap<Uuid, T::Id>,
}

impl<T: ProfileEntry> EntryCollection<T> {
    /// Read a collection from its slot.
    ///
    /// Entries repeating an earlier ID are dropped, and the default flag is
    /// repaired if the stored data does not carry exactly one.
    pub fn restore(persistence: Persistence, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut entries: Vec<T> = persistence.load(&key).unwrap_or_default();

        let stored = entries.len();
        let mut seen = HashSet::with_capacity(stored);
        entries.retain(|e| seen.insert(Into::<i32>::into(e.id())));
        if entries.len() < stored {
            warn!(
                key = %key,
                dropped = stored - entries.len(),
                "Dropping entries with duplicate IDs on restore"
            );
        }

        let defaults = entries.iter().filter(|e| e.is_default()).count();
        if !entries.is_empty() && defaults != 1 {
            let keep = entries
                .iter()
                .find(|e| e.is_default())
                .or_else(|| entries.first())
                .map(T::id);
            if let Some(id) = keep {
                warn!(key = %key, defaults, "Repairing default flag on restore");
                promote(&mut entries, id);
            }
        }

        let next_id = entries
            .iter()
            .map(|e| Into::<i32>::into(e.id()))
            .max()
            .map_or(Some(1), |max| max.checked_add(1));

        Self {
            entries,
            key,
            persistence,
            next_id,
            applied_tokens: HashMap::new(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    #[must_use]
    pub fn default_entry(&self) -> Option<&T> {
        self.entries.iter().find(|e| e.is_default())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Save a new entry under a fresh ID.
    ///
    /// The entry becomes the default if it is the first one or the draft
    /// asks for it.
    ///
    /// # Errors
    ///
    /// - `IdsExhausted` once every ID is taken
    /// - `Validation` if the draft is rejected
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn add(&mut self, draft: T::Draft) -> Result<&T> {
        let raw = self
            .next_id
            .ok_or(CommerceError::IdsExhausted { kind: T::KIND })?;
        let id = T::Id::from(raw);
        let make_default = self.entries.is_empty() || T::draft_requests_default(&draft);
        let entry = T::create(id, draft)?;

        let mut entries = self.entries.clone();
        entries.push(entry);
        if make_default {
            promote(&mut entries, id);
        }
        self.commit(entries)?;
        self.next_id = raw.checked_add(1);

        info!(kind = %T::KIND, id = %id, is_default = make_default, "Profile entry added");
        self.require(id)
    }

    /// [`EntryCollection::add`] guarded by an idempotency token.
    ///
    /// A repeated token returns the entry the first call created.
    ///
    /// # Errors
    ///
    /// Same as [`EntryCollection::add`], plus `NotFound` if the entry created
    /// by the first call has since been deleted.
    pub fn add_once(&mut self, draft: T::Draft, token: Uuid) -> Result<&T> {
        if let Some(&id) = self.applied_tokens.get(&token) {
            debug!(kind = %T::KIND, token = %token, "Profile add already applied");
            return self.require(id);
        }
        let id = self.add(draft)?.id();
        self.applied_tokens.insert(token, id);
        self.require(id)
    }

    /// Merge a patch into an entry.
    ///
    /// A patch with the default flag set promotes the entry; any other value
    /// of the flag is ignored.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no entry has `id`
    /// - `Validation` if the patched fields are rejected
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn update(&mut self, id: T::Id, patch: T::Patch) -> Result<&T> {
        let make_default = T::patch_requests_default(&patch);
        let mut entries = self.entries.clone();
        entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| CommerceError::not_found(T::KIND, id))?
            .apply(patch)?;
        if make_default {
            promote(&mut entries, id);
        }
        self.commit(entries)?;

        debug!(kind = %T::KIND, id = %id, "Profile entry updated");
        self.require(id)
    }

    /// Delete a non-default entry.
    ///
    /// The default is never deletable, so a non-empty collection always
    /// keeps at least one entry.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no entry has `id`
    /// - `DefaultDeletionForbidden` if the entry is the default
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn delete(&mut self, id: T::Id) -> Result<()> {
        if self.require(id)?.is_default() {
            return Err(CommerceError::DefaultDeletionForbidden {
                kind: T::KIND,
                id: id.into(),
            });
        }

        let entries = self
            .entries
            .iter()
            .filter(|e| e.id() != id)
            .cloned()
            .collect();
        self.commit(entries)?;

        info!(kind = %T::KIND, id = %id, "Profile entry deleted");
        Ok(())
    }

    /// Make `id` the default, clearing the flag everywhere else.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no entry has `id`
    /// - `RemoteFailure` if the slot write fails under the strict policy
    pub fn set_default(&mut self, id: T::Id) -> Result<()> {
        self.require(id)?;
        let mut entries = self.entries.clone();
        promote(&mut entries, id);
        self.commit(entries)?;

        info!(kind = %T::KIND, id = %id, "Default profile entry changed");
        Ok(())
    }

    fn require(&self, id: T::Id) -> Result<&T> {
        self.get(id)
            .ok_or_else(|| CommerceError::not_found(T::KIND, id))
    }

    fn commit(&mut self, entries: Vec<T>) -> Result<()> {
        self.persistence.write(&self.key, &entries)?;
        self.entries = entries;
        Ok(())
    }
}

/// The only place the default flag changes.
fn promote<T: ProfileEntry>(entries: &mut [T], id: T::Id) {
    for entry in entries {
        let is_target = entry.id() == id;
        entry.set_default_flag(is_target);
    }
}

// =============================================================================
// ProfileStore
// =============================================================================

/// Saved addresses and payment methods for one user.
#[derive(Debug)]
pub struct ProfileStore {
    user_id: UserId,
    addresses: EntryCollection<Address>,
    payment_methods: EntryCollection<PaymentMethod>,
}

impl ProfileStore {
    /// Read both collections for `user_id`.
    pub fn restore(persistence: &Persistence, user_id: UserId) -> Self {
        Self {
            user_id,
            addresses: EntryCollection::restore(persistence.clone(), keys::addresses(user_id)),
            payment_methods: EntryCollection::restore(
                persistence.clone(),
                keys::payment_methods(user_id),
            ),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub const fn addresses(&self) -> &EntryCollection<Address> {
        &self.addresses
    }

    pub const fn addresses_mut(&mut self) -> &mut EntryCollection<Address> {
        &mut self.addresses
    }

    #[must_use]
    pub const fn payment_methods(&self) -> &EntryCollection<PaymentMethod> {
        &self.payment_methods
    }

    pub const fn payment_methods_mut(&mut self) -> &mut EntryCollection<PaymentMethod> {
        &mut self.payment_methods
    }
}
