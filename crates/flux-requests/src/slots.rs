//! Slot setup and form/entity projection.
//!
//! Grounded on `original_source/flux/models/request.py`'s `SlotTypes` map,
//! `_setup_slots`, `generate_form`, `generate_entities` and
//! `_construct_product`.

use std::collections::BTreeMap;

use flux_core::FieldKind;
use flux_spec::{Layout, LayoutElement};
use serde_json::Value;
use uuid::Uuid;

use flux_persistence::{Product, Request, RequestSlot, Surrogate};

use crate::error::OperationError;

/// A slot declaration supplied by the caller at create/update time, before
/// it is persisted as a [`RequestSlot`] (`slots: token -> {title,
/// slot-type}`).
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub title: String,
    pub slot_type: String,
}

/// What a slot's type token projects to in the generated form.
///
/// The original's `SlotTypes` dict only special-cases `text`/`textarea`;
/// every other token is an opaque external-entity reference resolved
/// through a gridselector. Recovered verbatim from `models/request.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotTypeDescriptor {
    Text,
    Textarea,
    Entity,
}

impl SlotTypeDescriptor {
    pub fn classify(slot_type: &str) -> Self {
        match slot_type {
            "text" => SlotTypeDescriptor::Text,
            "textarea" => SlotTypeDescriptor::Textarea,
            _ => SlotTypeDescriptor::Entity,
        }
    }

    fn field_kind(self) -> FieldKind {
        match self {
            SlotTypeDescriptor::Text | SlotTypeDescriptor::Textarea => FieldKind::Text,
            SlotTypeDescriptor::Entity => FieldKind::Uuid,
        }
    }
}

/// `request._setup_slots` (classmethod): merges `slots` into the request's
/// persisted slot map, ordered by `slot_order` when given. Every key named
/// in `slot_order` must be consumed from `slots`, and every key in `slots`
/// must be named in `slot_order` — a mismatch in either direction is
/// `invalid-slot-order`.
pub fn setup_slots(
    slot_order: Option<&[String]>,
    slots: &BTreeMap<String, SlotSpec>,
) -> Result<BTreeMap<String, RequestSlot>, OperationError> {
    let mut remaining = slots.clone();
    let order: Vec<String> = slot_order
        .map(|o| o.to_vec())
        .unwrap_or_else(|| slots.keys().cloned().collect());

    let mut out = BTreeMap::new();
    for key in &order {
        let spec = remaining.remove(key).ok_or(OperationError::InvalidSlotOrder)?;
        out.insert(
            key.clone(),
            RequestSlot {
                title: spec.title,
                slot_type: spec.slot_type,
            },
        );
    }
    if !remaining.is_empty() {
        return Err(OperationError::InvalidSlotOrder);
    }
    Ok(out)
}

/// `request.generate_form`: projects slots (in `slot_order` order, falling
/// back to declaration order) into a typed schema + layout pair.
pub struct FormSpec {
    pub schema: FieldKind,
    pub layout: Layout,
}

pub fn generate_form(request: &Request) -> FormSpec {
    let order: Vec<String> = request
        .slot_order
        .clone()
        .unwrap_or_else(|| request.slots.keys().cloned().collect());

    let mut fields = BTreeMap::new();
    let mut elements = Vec::new();
    for token in &order {
        let Some(slot) = request.slots.get(token) else {
            continue;
        };
        let descriptor = SlotTypeDescriptor::classify(&slot.slot_type);
        fields.insert(token.clone(), descriptor.field_kind());
        elements.push(LayoutElement {
            field: token.clone(),
            label: Some(slot.title.clone()),
        });
    }

    FormSpec {
        schema: FieldKind::Structure(fields),
        layout: Layout(elements),
    }
}

/// `request.generate_entities`: inverts `products` into a token -> entity-id
/// map (the original's `product.product['id']` surrogate unwrap).
pub fn generate_entities(request: &Request) -> BTreeMap<String, String> {
    request
        .products
        .iter()
        .map(|(token, product)| (token.clone(), product.surrogate.entity_id.clone()))
        .collect()
}

/// A narrow seam over the external entity-directory/subject service, out
/// of scope here beyond its interface; recovered from the original's
/// `surrogate.acquire` call inside `_construct_product`.
#[async_trait::async_trait]
pub trait EntityDirectory: Send + Sync + 'static {
    /// Resolves `id` against the entity source named by `slot_type`.
    /// `Ok(None)` models the original's `GoneError` — the id no longer
    /// resolves to anything.
    async fn resolve(&self, slot_type: &str, id: &str) -> Result<Option<Value>, OperationError>;
}

/// `request._construct_product`: built-in slot types (`text`/`textarea`)
/// wrap the submitted value directly as a one-field surrogate; any other
/// slot type is resolved through `directory` and its `entity_id` becomes
/// the surrogate.
pub async fn construct_product(
    directory: &dyn EntityDirectory,
    request: &Request,
    token: &str,
    value_or_id: &str,
) -> Result<Product, OperationError> {
    let slot = request
        .slots
        .get(token)
        .ok_or_else(|| OperationError::InvalidSlot(token.to_string()))?;

    let descriptor = SlotTypeDescriptor::classify(&slot.slot_type);
    let surrogate = match descriptor {
        SlotTypeDescriptor::Text | SlotTypeDescriptor::Textarea => Surrogate {
            entity_type: slot.slot_type.clone(),
            entity_id: value_or_id.to_string(),
        },
        SlotTypeDescriptor::Entity => {
            let resolved = directory
                .resolve(&slot.slot_type, value_or_id)
                .await?
                .ok_or(OperationError::InvalidProduct)?;
            let entity_id = resolved
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(value_or_id)
                .to_string();
            Surrogate {
                entity_type: slot.slot_type.clone(),
                entity_id,
            }
        }
    };

    Ok(Product {
        token: token.to_string(),
        surrogate,
    })
}

/// Test double: resolves nothing, simulating a slot type with no external
/// entity source configured. Real deployments supply an HTTP-backed
/// `EntityDirectory` alongside `flux-dispatch`'s client style.
pub struct NullEntityDirectory;

#[async_trait::async_trait]
impl EntityDirectory for NullEntityDirectory {
    async fn resolve(&self, _slot_type: &str, _id: &str) -> Result<Option<Value>, OperationError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(title: &str, slot_type: &str) -> SlotSpec {
        SlotSpec {
            title: title.to_string(),
            slot_type: slot_type.to_string(),
        }
    }

    #[test]
    fn setup_slots_without_order_uses_declaration_order() {
        let slots = BTreeMap::from([
            ("a".to_string(), spec("A", "text")),
            ("b".to_string(), spec("B", "textarea")),
        ]);
        let result = setup_slots(None, &slots).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn setup_slots_rejects_order_missing_a_key() {
        let slots = BTreeMap::from([("a".to_string(), spec("A", "text"))]);
        let order = vec!["a".to_string(), "ghost".to_string()];
        let err = setup_slots(Some(&order), &slots).unwrap_err();
        assert!(matches!(err, OperationError::InvalidSlotOrder));
    }

    #[test]
    fn setup_slots_rejects_leftover_slot_not_named_in_order() {
        let slots = BTreeMap::from([
            ("a".to_string(), spec("A", "text")),
            ("b".to_string(), spec("B", "text")),
        ]);
        let order = vec!["a".to_string()];
        let err = setup_slots(Some(&order), &slots).unwrap_err();
        assert!(matches!(err, OperationError::InvalidSlotOrder));
    }

    #[test]
    fn entity_slot_type_projects_to_uuid_field() {
        assert_eq!(SlotTypeDescriptor::classify("gridselector-thing"), SlotTypeDescriptor::Entity);
        assert_eq!(SlotTypeDescriptor::classify("text"), SlotTypeDescriptor::Text);
    }

    #[tokio::test]
    async fn construct_product_wraps_text_slot_directly() {
        let request = Request {
            id: Uuid::now_v7(),
            name: "r".to_string(),
            status: flux_persistence::RequestStatus::Pending,
            originator: Uuid::now_v7(),
            assignee: None,
            creator: Uuid::now_v7(),
            template_id: None,
            slot_order: None,
            claimed: None,
            completed: None,
            attachments: vec![],
            slots: BTreeMap::from([(
                "note".to_string(),
                RequestSlot {
                    title: "Note".to_string(),
                    slot_type: "text".to_string(),
                },
            )]),
            products: BTreeMap::new(),
            messages: vec![],
        };
        let product = construct_product(&NullEntityDirectory, &request, "note", "hello").await.unwrap();
        assert_eq!(product.surrogate.entity_id, "hello");
    }
}
