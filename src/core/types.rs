//! Pixel encodings and the per-node information computed by the metadata pass.
//!
//! The component set is closed, so it is an enum: exhaustive matching keeps
//! the converter's rule table and the storage backends honest when a type is
//! added.

use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Numeric type of one pixel component.
///
/// Complex types hold a (real, imaginary) pair of their scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Complex of two `i16`
    CI16,
    /// Complex of two `i32`
    CI32,
    /// Complex of two `f32`
    CF32,
    /// Complex of two `f64`
    CF64,
}

impl ComponentType {
    /// Width in bytes of one component.
    pub fn size(&self) -> usize {
        match self {
            ComponentType::U8 | ComponentType::I8 => 1,
            ComponentType::U16 | ComponentType::I16 => 2,
            ComponentType::U32 | ComponentType::I32 | ComponentType::F32 => 4,
            ComponentType::U64 | ComponentType::I64 | ComponentType::F64 => 8,
            ComponentType::CI16 => 4,
            ComponentType::CI32 | ComponentType::CF32 => 8,
            ComponentType::CF64 => 16,
        }
    }

    /// Whether the component is a (real, imaginary) pair.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            ComponentType::CI16 | ComponentType::CI32 | ComponentType::CF32 | ComponentType::CF64
        )
    }

    /// The scalar type of each half of a complex component (identity for scalars).
    pub fn scalar(&self) -> ComponentType {
        match self {
            ComponentType::CI16 => ComponentType::I16,
            ComponentType::CI32 => ComponentType::I32,
            ComponentType::CF32 => ComponentType::F32,
            ComponentType::CF64 => ComponentType::F64,
            other => *other,
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::U8 => "uint8",
            ComponentType::I8 => "int8",
            ComponentType::U16 => "uint16",
            ComponentType::I16 => "int16",
            ComponentType::U32 => "uint32",
            ComponentType::I32 => "int32",
            ComponentType::U64 => "uint64",
            ComponentType::I64 => "int64",
            ComponentType::F32 => "float",
            ComponentType::F64 => "double",
            ComponentType::CI16 => "cint16",
            ComponentType::CI32 => "cint32",
            ComponentType::CF32 => "cfloat",
            ComponentType::CF64 => "cdouble",
        }
    }

    /// Every component type, in declaration order.
    pub fn all() -> &'static [ComponentType] {
        &[
            ComponentType::U8,
            ComponentType::I8,
            ComponentType::U16,
            ComponentType::I16,
            ComponentType::U32,
            ComponentType::I32,
            ComponentType::U64,
            ComponentType::I64,
            ComponentType::F32,
            ComponentType::F64,
            ComponentType::CI16,
            ComponentType::CI32,
            ComponentType::CF32,
            ComponentType::CF64,
        ]
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ComponentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let parsed = match lowered.as_str() {
            "uint8" | "u8" => ComponentType::U8,
            "int8" | "i8" => ComponentType::I8,
            "uint16" | "u16" => ComponentType::U16,
            "int16" | "i16" => ComponentType::I16,
            "uint32" | "u32" => ComponentType::U32,
            "int32" | "i32" => ComponentType::I32,
            "uint64" | "u64" => ComponentType::U64,
            "int64" | "i64" => ComponentType::I64,
            "float" | "f32" => ComponentType::F32,
            "double" | "f64" => ComponentType::F64,
            "cint16" | "ci16" => ComponentType::CI16,
            "cint32" | "ci32" => ComponentType::CI32,
            "cfloat" | "cf32" => ComponentType::CF32,
            "cdouble" | "cf64" => ComponentType::CF64,
            _ => return Err(format!("unknown component type '{}'", s)),
        };
        Ok(parsed)
    }
}

/// Component type plus component count of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelLayout {
    pub component: ComponentType,
    pub components: usize,
}

impl PixelLayout {
    pub fn new(component: ComponentType, components: usize) -> Self {
        Self {
            component,
            components,
        }
    }

    /// Single-component layout.
    pub fn scalar(component: ComponentType) -> Self {
        Self::new(component, 1)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.component.size() * self.components
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.components, self.component)
    }
}

/// Immutable key/value metadata threaded through the pipeline.
///
/// Cloning is cheap; [`MetadataSnapshot::with`] copies the map only when it is
/// shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot(Arc<BTreeMap<String, String>>);

impl MetadataSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Return a snapshot with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into());
        self
    }

    /// Return a snapshot holding the entries of both, `other` winning on conflicts.
    pub fn merged(mut self, other: &MetadataSnapshot) -> Self {
        if other.is_empty() {
            return self;
        }
        let map = Arc::make_mut(&mut self.0);
        for (k, v) in other.iter() {
            map.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What the metadata pass knows about a node's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInformation {
    /// Full extent the node can produce.
    pub largest_region: Region,
    /// Pixel encoding of the produced buffers.
    pub layout: PixelLayout,
    /// Native block grid of the underlying data, when it has one.
    pub block_size: Option<[u64; 2]>,
    pub metadata: MetadataSnapshot,
}

impl OutputInformation {
    pub fn new(largest_region: Region, layout: PixelLayout) -> Self {
        Self {
            largest_region,
            layout,
            block_size: None,
            metadata: MetadataSnapshot::new(),
        }
    }

    pub fn with_block_size(mut self, block_size: [u64; 2]) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataSnapshot) -> Self {
        self.metadata = metadata;
        self
    }
}
