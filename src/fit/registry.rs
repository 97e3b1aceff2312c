//! Local message type assignment
//!
//! Each global message number gets a local type (0, 1, 2, ...) the first time it is
//! written in a file. The layout fixed by that first record is reused for every later
//! record of the same global number. Local types never wrap: a file can describe at
//! most [`MAX_LOCAL_TYPES`] message types.

use std::collections::HashMap;

use super::format::{ARCHITECTURE_BIG_ENDIAN, DEFINITION_BIT, FieldDefinition};
use super::inference::FieldSlot;
use crate::{Result, TelemetryError};

/// Number of local message types addressable by a normal record header.
pub const MAX_LOCAL_TYPES: usize = 16;

/// Field count a definition record can describe in its one-byte count.
pub const MAX_FIELDS: usize = u8::MAX as usize;

/// The fixed layout of one message type.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLayout {
    pub global_id: u16,
    pub local_type: u8,
    /// Slots in ascending field-id order
    pub slots: Vec<FieldSlot>,
}

impl MessageLayout {
    pub fn new(global_id: u16, local_type: u8, mut slots: Vec<FieldSlot>) -> Self {
        slots.sort_by_key(|slot| slot.definition.field_id);
        Self { global_id, local_type, slots }
    }

    pub fn field_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().map(|slot| slot.definition.field_id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.slots.iter().map(|slot| &slot.definition)
    }

    /// Bytes in a data record for this layout, including the record header.
    pub fn record_size(&self) -> usize {
        1 + self.slots.iter().map(|slot| slot.definition.size as usize).sum::<usize>()
    }

    /// Append the definition record for this layout.
    pub fn write_definition(&self, out: &mut Vec<u8>) {
        out.push(DEFINITION_BIT | self.local_type);
        out.push(0);
        out.push(ARCHITECTURE_BIG_ENDIAN);
        out.extend_from_slice(&self.global_id.to_be_bytes());
        out.push(self.slots.len() as u8);
        for def in self.definitions() {
            out.extend_from_slice(&[def.field_id, def.size, def.base_type.code()]);
        }
    }
}

/// Global message number to local type map for one file session.
#[derive(Debug, Default)]
pub struct MessageDefinitionRegistry {
    layouts: Vec<MessageLayout>,
    by_global: HashMap<u16, usize>,
}

impl MessageDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn get(&self, global_id: u16) -> Option<&MessageLayout> {
        self.by_global.get(&global_id).map(|&index| &self.layouts[index])
    }

    /// Layouts in local-type order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageLayout> {
        self.layouts.iter()
    }

    /// The local type the next new message type would receive.
    pub fn next_local_type(&self, global_id: u16) -> Result<u8> {
        if self.layouts.len() >= MAX_LOCAL_TYPES {
            return Err(TelemetryError::LocalTypeCapacity {
                global_id,
                capacity: MAX_LOCAL_TYPES,
            });
        }
        Ok(self.layouts.len() as u8)
    }

    /// Register a layout built against [`next_local_type`](Self::next_local_type).
    pub fn register(&mut self, layout: MessageLayout) -> Result<&MessageLayout> {
        if self.by_global.contains_key(&layout.global_id) {
            return Err(TelemetryError::layout_mismatch(
                layout.global_id,
                "message type is already defined in this file",
            ));
        }
        let expected = self.next_local_type(layout.global_id)?;
        if layout.local_type != expected {
            return Err(TelemetryError::layout_mismatch(
                layout.global_id,
                format!("local type {} registered out of order, expected {}", layout.local_type, expected),
            ));
        }
        let index = self.layouts.len();
        self.by_global.insert(layout.global_id, index);
        self.layouts.push(layout);
        Ok(&self.layouts[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::format::BaseType;

    fn slot(field_id: u8, base_type: BaseType) -> FieldSlot {
        FieldSlot {
            definition: FieldDefinition {
                field_id,
                size: base_type.fixed_size().unwrap_or(1) as u8,
                base_type,
            },
            angle: false,
        }
    }

    #[test]
    fn local_types_are_sequential() {
        let mut registry = MessageDefinitionRegistry::new();
        for (n, global_id) in [0u16, 21, 20].into_iter().enumerate() {
            let local = registry.next_local_type(global_id).unwrap();
            assert_eq!(local as usize, n);
            registry.register(MessageLayout::new(global_id, local, vec![])).unwrap();
        }
        assert_eq!(registry.get(20).unwrap().local_type, 2);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn capacity_is_sixteen_without_wrap() {
        let mut registry = MessageDefinitionRegistry::new();
        for global_id in 0..MAX_LOCAL_TYPES as u16 {
            let local = registry.next_local_type(global_id).unwrap();
            registry.register(MessageLayout::new(global_id, local, vec![])).unwrap();
        }
        let err = registry.next_local_type(999).unwrap_err();
        assert!(matches!(err, TelemetryError::LocalTypeCapacity { global_id: 999, capacity: 16 }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = MessageDefinitionRegistry::new();
        registry.register(MessageLayout::new(20, 0, vec![])).unwrap();
        assert!(registry.register(MessageLayout::new(20, 1, vec![])).is_err());
    }

    #[test]
    fn definition_record_bytes() {
        let layout = MessageLayout::new(
            20,
            3,
            vec![slot(253, BaseType::UInt32), slot(6, BaseType::UInt16), slot(0, BaseType::SInt32)],
        );
        let mut out = Vec::new();
        layout.write_definition(&mut out);
        assert_eq!(
            out,
            vec![
                0x43, 0x00, 0x01, 0x00, 0x14, 0x03, //
                0, 4, 0x85, //
                6, 2, 0x84, //
                253, 4, 0x86,
            ]
        );
        assert_eq!(layout.record_size(), 11);
        assert_eq!(layout.field_ids().collect::<Vec<_>>(), vec![0, 6, 253]);
    }
}
