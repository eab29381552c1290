//! RoleSet - Insieme dei ruoli di un utente
//!
//! I ruoli non sono mutuamente esclusivi: un utente può essere sia vendor che admin.
//! L'insieme vuoto rappresenta il cliente ("user" sul protocollo).

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

const ADMIN: u8 = 1;
const VENDOR: u8 = 1 << 1;
const DELIVERY: u8 = 1 << 2;
const STAFF_MASK: u8 = ADMIN | VENDOR | DELIVERY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const CUSTOMER: RoleSet = RoleSet(0);
    pub const ADMIN: RoleSet = RoleSet(ADMIN);
    pub const VENDOR: RoleSet = RoleSet(VENDOR);
    pub const DELIVERY: RoleSet = RoleSet(DELIVERY);

    /// Costruisce l'insieme a partire dai flag booleani della directory
    pub fn from_flags(is_admin: bool, is_owner: bool, is_delivery: bool) -> Self {
        let mut bits = 0;
        if is_admin {
            bits |= ADMIN;
        }
        if is_owner {
            bits |= VENDOR;
        }
        if is_delivery {
            bits |= DELIVERY;
        }
        RoleSet(bits)
    }

    pub fn is_admin(self) -> bool {
        self.0 & ADMIN != 0
    }

    pub fn is_vendor(self) -> bool {
        self.0 & VENDOR != 0
    }

    pub fn is_delivery(self) -> bool {
        self.0 & DELIVERY != 0
    }

    /// Vero se l'utente ha almeno un ruolo di staff (admin, vendor, delivery)
    pub fn has_staff_role(self) -> bool {
        self.0 & STAFF_MASK != 0
    }

    pub fn is_customer(self) -> bool {
        !self.has_staff_role()
    }

    /// Etichette usate sul protocollo, in ordine stabile
    pub fn labels(self) -> Vec<&'static str> {
        let mut labels = Vec::with_capacity(3);
        if self.is_admin() {
            labels.push("admin");
        }
        if self.is_vendor() {
            labels.push("vendor");
        }
        if self.is_delivery() {
            labels.push("delivery");
        }
        if labels.is_empty() {
            labels.push("user");
        }
        labels
    }

    /// Inverso di `labels`; etichette sconosciute vengono ignorate
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels.into_iter().fold(RoleSet::CUSTOMER, |acc, label| match label {
            "admin" => acc | RoleSet::ADMIN,
            "vendor" | "owner" => acc | RoleSet::VENDOR,
            "delivery" => acc | RoleSet::DELIVERY,
            _ => acc,
        })
    }
}

impl BitOr for RoleSet {
    type Output = RoleSet;

    fn bitor(self, rhs: RoleSet) -> RoleSet {
        RoleSet(self.0 | rhs.0)
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let labels = self.labels();
        let mut seq = serializer.serialize_seq(Some(labels.len()))?;
        for label in labels {
            seq.serialize_element(label)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let labels = Vec::<String>::deserialize(deserializer)?;
        Ok(RoleSet::from_labels(labels.iter().map(String::as_str)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_is_customer() {
        let roles = RoleSet::from_flags(false, false, false);
        assert!(roles.is_customer());
        assert!(!roles.has_staff_role());
        assert_eq!(roles.labels(), vec!["user"]);
    }

    #[test]
    fn test_any_staff_flag_is_staff() {
        assert!(RoleSet::from_flags(true, false, false).has_staff_role());
        assert!(RoleSet::from_flags(false, true, false).has_staff_role());
        assert!(RoleSet::from_flags(false, false, true).has_staff_role());
    }

    #[test]
    fn test_roles_are_not_exclusive() {
        let roles = RoleSet::ADMIN | RoleSet::VENDOR;
        assert!(roles.is_admin() && roles.is_vendor());
        assert!(!roles.is_delivery());
        assert_eq!(roles.labels(), vec!["admin", "vendor"]);
    }

    #[test]
    fn test_serde_uses_labels() {
        let roles = RoleSet::VENDOR | RoleSet::DELIVERY;
        let json = serde_json::to_value(roles).unwrap();
        assert_eq!(json, serde_json::json!(["vendor", "delivery"]));

        let back: RoleSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, roles);

        let customer: RoleSet = serde_json::from_str(r#"["user"]"#).unwrap();
        assert!(customer.is_customer());
    }
}
