//! Saved shipping addresses.

use serde::{Deserialize, Serialize};

use super::id::AddressId;

/// A saved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    /// Label chosen by the customer ("Home", "Work").
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_default: bool,
}

impl Address {
    /// Build a saved address from a draft and an assigned ID.
    ///
    /// The default flag is left cleared; the profile store sets it.
    #[must_use]
    pub fn from_draft(id: AddressId, draft: NewAddress) -> Self {
        Self {
            id,
            name: draft.name,
            street: draft.street,
            city: draft.city,
            state: draft.state,
            zip_code: draft.zip_code,
            country: draft.country,
            is_default: false,
        }
    }

    /// Merge the present fields of `patch`. The default flag is untouched.
    pub fn apply(&mut self, patch: AddressPatch) {
        let AddressPatch {
            name,
            street,
            city,
            state,
            zip_code,
            country,
            is_default: _,
        } = patch;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(street) = street {
            self.street = street;
        }
        if let Some(city) = city {
            self.city = city;
        }
        if let Some(state) = state {
            self.state = state;
        }
        if let Some(zip_code) = zip_code {
            self.zip_code = zip_code;
        }
        if let Some(country) = country {
            self.country = country;
        }
    }

    /// Single-line rendering for order summaries.
    #[must_use]
    pub fn one_line(&self) -> String {
        format!(
            "{}, {}, {} {}, {}",
            self.street, self.city, self.state, self.zip_code, self.country
        )
    }
}

/// A new address before an ID is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update for an [`Address`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPatch {
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub is_default: Option<bool>,
}
