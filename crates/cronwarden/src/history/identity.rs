/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Identity allocation under the installation owner's privileges.
//!
//! Callers of the recording entry points usually have no grant on the id
//! sequences, and may not be allowed to become the owner's role either. The
//! allocator therefore borrows the owner's privilege for the duration of one
//! increment through an [`ElevatedPrivilege`] guard; the session's login role
//! never changes, and the caller's privilege is restored on every exit path.
//!
//! Sequence increments are not transactional: an id handed out inside a
//! transaction that later aborts is never reused, and ids may have gaps.

use std::ops::{Deref, DerefMut};

use once_cell::sync::OnceCell;
use tracing::{debug, error};

use crate::error::{AllocationError, StoreError};
use crate::store::{Allocation, Privilege, StoreSession};

/// Scoped privilege elevation on a session.
///
/// While the guard is alive, sequence access on the session runs with the
/// assumed owner's privilege. Dropping the guard (or calling
/// [`ElevatedPrivilege::release`]) restores the privilege that was in effect
/// when it was created.
pub struct ElevatedPrivilege<'s> {
    session: &'s mut dyn StoreSession,
    saved: Option<Privilege>,
}

impl<'s> ElevatedPrivilege<'s> {
    /// Borrows the privilege of `owner` on `session`.
    pub fn assume(session: &'s mut dyn StoreSession, owner: &str) -> Result<Self, StoreError> {
        let saved = session.privilege();
        session.set_privilege(Privilege::Owner(owner.to_string()))?;
        debug!(from = ?saved, owner = %owner, "Assumed installation owner privilege");
        Ok(Self {
            session,
            saved: Some(saved),
        })
    }

    /// Restores the saved privilege, reporting a failure to do so.
    pub fn release(mut self) -> Result<(), StoreError> {
        match self.saved.take() {
            Some(privilege) => self.session.set_privilege(privilege),
            None => Ok(()),
        }
    }
}

impl<'s> Deref for ElevatedPrivilege<'s> {
    type Target = dyn StoreSession + 's;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl<'s> DerefMut for ElevatedPrivilege<'s> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for ElevatedPrivilege<'_> {
    fn drop(&mut self) {
        if let Some(privilege) = self.saved.take() {
            if let Err(e) = self.session.set_privilege(privilege.clone()) {
                error!(privilege = ?privilege, error = %e, "Failed to restore privilege after elevation");
            }
        }
    }
}

/// Hands out identifiers from named sequences as the installation owner.
#[derive(Debug)]
pub struct IdentityAllocator {
    extension_name: String,
    owner: OnceCell<String>,
}

impl IdentityAllocator {
    /// Creates an allocator that elevates to the owner of `extension_name`.
    pub fn new(extension_name: impl Into<String>) -> Self {
        Self {
            extension_name: extension_name.into(),
            owner: OnceCell::new(),
        }
    }

    /// Name of the extension whose owner performs allocation.
    pub fn extension_name(&self) -> &str {
        &self.extension_name
    }

    /// Returns the owning role, resolving it on first use.
    pub fn owner(&self, session: &mut dyn StoreSession) -> Result<&str, AllocationError> {
        let owner = self.owner.get_or_try_init(|| {
            let owner = session
                .extension_owner(&self.extension_name)
                .map_err(AllocationError::Store)?
                .ok_or_else(|| AllocationError::ExtensionNotInstalled(self.extension_name.clone()))?;
            debug!(extension = %self.extension_name, owner = %owner, "Resolved installation owner");
            Ok::<_, AllocationError>(owner)
        })?;
        Ok(owner.as_str())
    }

    /// Advances `sequence` as the installation owner and returns the new value.
    ///
    /// The caller's privilege is in effect again when this returns, whether
    /// or not the increment succeeded.
    pub fn next_id(
        &self,
        session: &mut dyn StoreSession,
        sequence: &str,
    ) -> Result<i64, AllocationError> {
        self.allocate(session, sequence).map(|a| a.value)
    }

    /// Like [`IdentityAllocator::next_id`], also returning the time the
    /// store handed the value out.
    pub fn allocate(
        &self,
        session: &mut dyn StoreSession,
        sequence: &str,
    ) -> Result<Allocation, AllocationError> {
        let owner = self.owner(session)?;

        let mut elevated =
            ElevatedPrivilege::assume(session, owner).map_err(AllocationError::Elevation)?;
        let allocation = match elevated.next_value(sequence) {
            Ok(allocation) => allocation,
            Err(StoreError::UndefinedObject(_)) => {
                return Err(AllocationError::SequenceNotFound(sequence.to_string()))
            }
            Err(e) => return Err(AllocationError::Store(e)),
        };
        elevated.release().map_err(AllocationError::Elevation)?;

        debug!(sequence = %sequence, value = allocation.value, "Allocated identifier");
        Ok(allocation)
    }
}
