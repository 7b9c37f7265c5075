//! Property registry
//!
//! Device classes and their properties are compiled in (see [`classes`]). At
//! startup they are folded into a dense group → class → property table that
//! the reactor and devices share through an `Arc`.

pub mod classes;
mod codec;
mod property_map;

use std::fmt;

pub use codec::Codec;
pub use property_map::{PROPERTY_MAP, parse_property_map};

use crate::error::{Error, Result};
use crate::key::ClassCode;

/// One property (EPC) within a class.
///
/// Decoder only is read-only, encoder only is write-only, both is read-write,
/// neither marks a presence-only property such as a property map.
#[derive(Debug)]
pub struct Property {
    pub code: u8,
    /// Stable external identifier used to route callbacks.
    pub channel: &'static str,
    pub decoder: Option<Codec>,
    pub encoder: Option<Codec>,
}

impl Property {
    pub const fn read_only(code: u8, channel: &'static str, codec: Codec) -> Self {
        Self {
            code,
            channel,
            decoder: Some(codec),
            encoder: None,
        }
    }

    pub const fn write_only(code: u8, channel: &'static str, codec: Codec) -> Self {
        Self {
            code,
            channel,
            decoder: None,
            encoder: Some(codec),
        }
    }

    pub const fn read_write(code: u8, channel: &'static str, codec: Codec) -> Self {
        Self {
            code,
            channel,
            decoder: Some(codec),
            encoder: Some(codec),
        }
    }

    pub const fn marker(code: u8, channel: &'static str) -> Self {
        Self {
            code,
            channel,
            decoder: None,
            encoder: None,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.encoder.is_some()
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.channel, self.code)
    }
}

/// A device class with its three property scopes.
#[derive(Debug)]
pub struct DeviceClass {
    pub name: &'static str,
    pub code: ClassCode,
    /// Super-class properties common to every object of the kind.
    pub device_properties: &'static [Property],
    pub group_properties: &'static [Property],
    pub class_properties: &'static [Property],
}

impl DeviceClass {
    /// All properties, most specific scope last.
    pub fn properties(&self) -> impl Iterator<Item = &'static Property> + use<> {
        let (device, group, class) = (
            self.device_properties,
            self.group_properties,
            self.class_properties,
        );
        device.iter().chain(group).chain(class)
    }
}

struct ClassTable {
    class: &'static DeviceClass,
    properties: Box<[Option<&'static Property>; 256]>,
}

/// Dense (group, class, property) lookup table.
pub struct PropertyRegistry {
    groups: Vec<Option<Vec<Option<ClassTable>>>>,
    class_count: usize,
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyRegistry {
    /// Build the table from every compiled-in class.
    pub fn new() -> Self {
        Self::from_classes(&classes::ALL_CLASSES)
    }

    /// Build the table from an explicit class list.
    ///
    /// # Panics
    ///
    /// On a duplicate class or a duplicate property code within one class.
    /// Both are mistakes in the compiled-in tables.
    pub fn from_classes(classes: &[&'static DeviceClass]) -> Self {
        let mut groups: Vec<Option<Vec<Option<ClassTable>>>> = (0..256).map(|_| None).collect();

        for &class in classes {
            let group = groups[class.code.group as usize]
                .get_or_insert_with(|| (0..256).map(|_| None).collect());
            let slot = &mut group[class.code.class as usize];
            assert!(slot.is_none(), "class {} registered twice", class.code);

            let mut properties: Box<[Option<&'static Property>; 256]> = Box::new([None; 256]);
            for property in class.properties() {
                let entry = &mut properties[property.code as usize];
                if let Some(existing) = entry {
                    panic!(
                        "class {} defines 0x{:02X} twice ({} and {})",
                        class.code, property.code, existing.channel, property.channel
                    );
                }
                *entry = Some(property);
            }

            *slot = Some(ClassTable { class, properties });
        }

        tracing::debug!("Property registry built with {} classes", classes.len());
        Self {
            groups,
            class_count: classes.len(),
        }
    }

    fn table(&self, code: ClassCode) -> Option<&ClassTable> {
        self.groups[code.group as usize]
            .as_ref()
            .and_then(|group| group[code.class as usize].as_ref())
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn class(&self, code: ClassCode) -> Result<&'static DeviceClass> {
        self.table(code)
            .map(|t| t.class)
            .ok_or(Error::UnknownClass(code))
    }

    pub fn contains_class(&self, code: ClassCode) -> bool {
        self.table(code).is_some()
    }

    /// Resolve a property code within a class.
    pub fn resolve(&self, class: ClassCode, code: u8) -> Result<&'static Property> {
        let table = self.table(class).ok_or(Error::UnknownClass(class))?;
        table.properties[code as usize].ok_or(Error::UnknownProperty { class, code })
    }

    /// Find a property by its external channel identifier.
    pub fn find_channel(&self, class: ClassCode, channel: &str) -> Option<&'static Property> {
        let table = self.table(class)?;
        table
            .properties
            .iter()
            .flatten()
            .find(|p| p.channel == channel)
            .copied()
    }

    /// Every property registered for a class, ordered by code.
    pub fn device_properties_of(&self, class: ClassCode) -> Result<Vec<&'static Property>> {
        let table = self.table(class).ok_or(Error::UnknownClass(class))?;
        Ok(table.properties.iter().flatten().copied().collect())
    }

    pub fn classes(&self) -> impl Iterator<Item = &'static DeviceClass> + '_ {
        self.groups
            .iter()
            .flatten()
            .flat_map(|group| group.iter().flatten())
            .map(|t| t.class)
    }
}
