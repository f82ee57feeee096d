use std::{collections::HashMap, sync::Arc};

use crate::{
    data_structures::{Matrix, Rectangle},
    error::{RenderError, RenderResult},
    resolve::Resolve,
};

/// The object vocabulary the external PDF parser hands to the renderer.
///
/// This is the interchange type of the [`crate::document::PdfDocument`]
/// contract: resource dictionaries, operands inside content streams, and
/// annotation dictionaries are all made of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    True,
    False,
    Integer(i32),
    Real(f32),
    /// Raw string bytes. Text-showing operators interpret them through the
    /// current font's encoding; no character set is assumed here.
    String(Vec<u8>),
    Name(String),
    Array(Vec<Self>),
    Stream(Arc<StreamObject>),
    Dictionary(Dictionary),
    Reference(Reference),
}

impl Object {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            &Object::Integer(i) => Some(i as f32),
            &Object::Real(r) => Some(r),
            _ => None,
        }
    }
}

/// A stream as delivered by the external parser: the dictionary plus the
/// raw payload bytes, still encoded. [`crate::filter::decode_stream`]
/// applies the dictionary's filter chain.
#[derive(Debug, PartialEq)]
pub struct StreamObject {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

/// A reference to a non-existing object is considered a `null`
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct Reference {
    pub object_number: usize,
    pub generation: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    dict: HashMap<String, Object>,
}

impl Dictionary {
    pub fn new(dict: HashMap<String, Object>) -> Self {
        Self { dict }
    }

    pub fn empty() -> Self {
        Self {
            dict: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Object) {
        self.dict.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.dict.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Object)> {
        self.dict.iter()
    }

    /// The raw, possibly-indirect object stored under `key`.
    pub fn get_object(&self, key: &str) -> Option<&Object> {
        self.dict.get(key)
    }

    /// The object stored under `key` with indirect references chased.
    pub fn get(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<Object>> {
        self.dict
            .get(key)
            .cloned()
            .map(|obj| resolver.resolve(obj))
            .transpose()
    }

    pub fn get_number(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<f32>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_number(obj))
            .transpose()
    }

    pub fn get_integer(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<i32>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_integer(obj))
            .transpose()
    }

    pub fn get_name(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<String>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_name(obj))
            .transpose()
    }

    pub fn get_string(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<Vec<u8>>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_string(obj))
            .transpose()
    }

    pub fn get_bool(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<bool>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_bool(obj))
            .transpose()
    }

    pub fn get_arr(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<Vec<Object>>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_arr(obj))
            .transpose()
    }

    pub fn get_dict(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<Dictionary>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_dict(obj))
            .transpose()
    }

    pub fn get_stream(
        &self,
        key: &str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Option<Arc<StreamObject>>> {
        self.get(key, resolver)?
            .map(|obj| resolver.assert_stream(obj))
            .transpose()
    }

    pub fn get_number_arr(
        &self,
        key: &str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Option<Vec<f32>>> {
        self.get_arr(key, resolver)?
            .map(|arr| {
                arr.into_iter()
                    .map(|obj| resolver.assert_number(obj))
                    .collect()
            })
            .transpose()
    }

    pub fn get_rectangle(
        &self,
        key: &str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Option<Rectangle>> {
        self.get_arr(key, resolver)?
            .map(|arr| Rectangle::from_arr(arr, resolver))
            .transpose()
    }

    pub fn get_matrix(&self, key: &str, resolver: &dyn Resolve) -> RenderResult<Option<Matrix>> {
        self.get_arr(key, resolver)?
            .map(|arr| Matrix::from_arr(arr, resolver))
            .transpose()
    }

    pub fn expect_number(&self, key: &'static str, resolver: &dyn Resolve) -> RenderResult<f32> {
        self.get_number(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }

    pub fn expect_integer(&self, key: &'static str, resolver: &dyn Resolve) -> RenderResult<i32> {
        self.get_integer(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }

    pub fn expect_name(&self, key: &'static str, resolver: &dyn Resolve) -> RenderResult<String> {
        self.get_name(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }

    pub fn expect_arr(
        &self,
        key: &'static str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Vec<Object>> {
        self.get_arr(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }

    pub fn expect_dict(
        &self,
        key: &'static str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Dictionary> {
        self.get_dict(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }

    pub fn expect_rectangle(
        &self,
        key: &'static str,
        resolver: &dyn Resolve,
    ) -> RenderResult<Rectangle> {
        self.get_rectangle(key, resolver)?
            .ok_or(RenderError::InvalidReference {
                name: key.to_owned(),
            })
    }
}

pub fn assert_len(arr: &[Object], len: usize) -> RenderResult<()> {
    if arr.len() != len {
        return Err(RenderError::DecodeError {
            reason: format!("expected array of length {}, found {}", len, arr.len()),
        });
    }

    Ok(())
}
