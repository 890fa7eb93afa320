//! Codecs describe how a host value is serialized: which BSON type a scalar
//! becomes and, for documents, which element name each member is stored
//! under. The translator never encodes or decodes values itself; it only uses
//! codecs to resolve member access to field paths and to describe the shape of
//! the rows the emitted pipeline returns.

use crate::query::ValueType;
use std::{collections::HashMap, sync::Arc};

#[cfg(test)]
mod test;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BsonType {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal128,
    String,
    DateTime,
    ObjectId,
    Null,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Codec {
    Scalar(BsonType),
    /// An untyped value. Members of a dynamic document are addressed by name.
    Dynamic,
    Document(Arc<ClassMap>),
    Array(ArrayCodec),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ArrayCodec {
    /// `None` when the item serializer cannot be determined.
    pub item: Option<Box<Codec>>,
}

impl Codec {
    pub fn boolean() -> Self {
        Codec::Scalar(BsonType::Boolean)
    }

    pub fn int32() -> Self {
        Codec::Scalar(BsonType::Int32)
    }

    pub fn int64() -> Self {
        Codec::Scalar(BsonType::Int64)
    }

    pub fn double() -> Self {
        Codec::Scalar(BsonType::Double)
    }

    pub fn string() -> Self {
        Codec::Scalar(BsonType::String)
    }

    pub fn array_of(item: Codec) -> Self {
        Codec::Array(ArrayCodec {
            item: Some(Box::new(item)),
        })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Codec::Array(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Codec::Scalar(BsonType::Boolean))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Codec::Scalar(BsonType::Double))
    }

    /// The item codec of an array codec. `None` for non-arrays and for arrays
    /// whose item serializer is unknown.
    pub fn item(&self) -> Option<&Codec> {
        match self {
            Codec::Array(ArrayCodec { item }) => item.as_deref(),
            _ => None,
        }
    }

    pub fn class_map(&self) -> Option<&Arc<ClassMap>> {
        match self {
            Codec::Document(class_map) => Some(class_map),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum MemberType {
    /// A member of a registered class. Resolved through the registry when
    /// the member is accessed, so classes may refer to themselves.
    Declared(ValueType),
    /// A member of a class map synthesized from a projection.
    Synthesized(Codec),
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberMap {
    pub member_name: String,
    pub element_name: String,
    pub member_type: MemberType,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ClassMap {
    pub type_name: String,
    pub discriminator: Option<String>,
    pub members: Vec<MemberMap>,
}

impl ClassMap {
    pub fn new(type_name: &str) -> Self {
        ClassMap {
            type_name: type_name.to_string(),
            discriminator: None,
            members: vec![],
        }
    }

    pub fn discriminator(mut self, discriminator: &str) -> Self {
        self.discriminator = Some(discriminator.to_string());
        self
    }

    pub fn member(mut self, member_name: &str, element_name: &str, member_type: ValueType) -> Self {
        self.members.push(MemberMap {
            member_name: member_name.to_string(),
            element_name: element_name.to_string(),
            member_type: MemberType::Declared(member_type),
        });
        self
    }

    /// A class map for an anonymous projection: every member is stored under
    /// its own name.
    pub fn synthesized(members: impl IntoIterator<Item = (String, Codec)>) -> Self {
        ClassMap {
            type_name: "<anonymous>".to_string(),
            discriminator: None,
            members: members
                .into_iter()
                .map(|(name, codec)| MemberMap {
                    element_name: name.clone(),
                    member_name: name,
                    member_type: MemberType::Synthesized(codec),
                })
                .collect(),
        }
    }

    pub fn find_member(&self, member_name: &str) -> Option<&MemberMap> {
        self.members.iter().find(|m| m.member_name == member_name)
    }
}

/// Describes how the rows returned by the emitted pipeline are decoded.
#[derive(PartialEq, Debug, Clone)]
pub enum OutputCodec {
    /// Each row is a whole document.
    Document(Codec),
    /// Each row wraps a single value stored under `field`.
    Value { field: String, codec: Codec },
}

/// Maps static types to codecs. Built once and read-only afterwards, so a
/// single registry can serve concurrent translations.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    class_maps: HashMap<String, Arc<ClassMap>>,
}

#[derive(Debug, Default)]
pub struct CodecRegistryBuilder {
    class_maps: HashMap<String, Arc<ClassMap>>,
}

impl CodecRegistryBuilder {
    pub fn register(mut self, class_map: ClassMap) -> Self {
        self.class_maps
            .insert(class_map.type_name.clone(), Arc::new(class_map));
        self
    }

    pub fn build(self) -> CodecRegistry {
        CodecRegistry {
            class_maps: self.class_maps,
        }
    }
}

impl CodecRegistry {
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    pub fn class_map(&self, name: &str) -> Option<Arc<ClassMap>> {
        self.class_maps.get(name).cloned()
    }

    pub fn lookup(&self, value_type: &ValueType) -> Option<Codec> {
        Some(match value_type {
            ValueType::Boolean => Codec::Scalar(BsonType::Boolean),
            ValueType::Int32 => Codec::Scalar(BsonType::Int32),
            ValueType::Int64 => Codec::Scalar(BsonType::Int64),
            ValueType::Double => Codec::Scalar(BsonType::Double),
            ValueType::Decimal128 => Codec::Scalar(BsonType::Decimal128),
            ValueType::String => Codec::Scalar(BsonType::String),
            ValueType::DateTime => Codec::Scalar(BsonType::DateTime),
            ValueType::ObjectId => Codec::Scalar(BsonType::ObjectId),
            ValueType::Object => Codec::Dynamic,
            ValueType::Document(name) => Codec::Document(self.class_map(name)?),
            ValueType::Array(item) => Codec::Array(ArrayCodec {
                item: self.lookup(item).map(Box::new),
            }),
        })
    }

    /// Resolves a member of a document codec to the element name it is
    /// serialized under and the codec of its value.
    pub fn member(&self, codec: &Codec, member: &str) -> Option<(String, Codec)> {
        match codec {
            Codec::Document(class_map) => {
                let member_map = class_map.find_member(member)?;
                let member_codec = match &member_map.member_type {
                    MemberType::Declared(value_type) => self.lookup(value_type)?,
                    MemberType::Synthesized(codec) => codec.clone(),
                };
                Some((member_map.element_name.clone(), member_codec))
            }
            Codec::Dynamic => Some((member.to_string(), Codec::Dynamic)),
            Codec::Scalar(_) | Codec::Array(_) => None,
        }
    }
}
