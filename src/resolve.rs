use std::sync::Arc;

use crate::{
    error::{RenderError, RenderResult},
    objects::{Dictionary, Object, Reference, StreamObject},
};

/// The indirect-object lookup capability of the external PDF parser.
///
/// All methods take `&self`: an implementation backed by a mutable lexer
/// must synchronize internally, which is what lets resource dictionaries be
/// shared across page workers.
pub trait Resolve {
    fn resolve_reference(&self, reference: Reference) -> RenderResult<Object>;

    /// Resolve all references
    fn resolve(&self, obj: Object) -> RenderResult<Object> {
        match obj {
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.resolve(obj)
            }
            obj => Ok(obj),
        }
    }

    fn assert_integer(&self, obj: Object) -> RenderResult<i32> {
        match obj {
            Object::Integer(i) => Ok(i),
            Object::Real(r) if r.fract() == 0.0 => Ok(r as i32),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_integer(obj)
            }
            obj => Err(mismatch("integer", &obj)),
        }
    }

    /// Either an integer, or a real
    fn assert_number(&self, obj: Object) -> RenderResult<f32> {
        match obj {
            Object::Integer(i) => Ok(i as f32),
            Object::Real(r) => Ok(r),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_number(obj)
            }
            obj => Err(mismatch("number", &obj)),
        }
    }

    fn assert_name(&self, obj: Object) -> RenderResult<String> {
        match obj {
            Object::Name(n) => Ok(n),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_name(obj)
            }
            obj => Err(mismatch("name", &obj)),
        }
    }

    fn assert_string(&self, obj: Object) -> RenderResult<Vec<u8>> {
        match obj {
            Object::String(s) => Ok(s),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_string(obj)
            }
            obj => Err(mismatch("string", &obj)),
        }
    }

    fn assert_bool(&self, obj: Object) -> RenderResult<bool> {
        match obj {
            Object::True => Ok(true),
            Object::False => Ok(false),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_bool(obj)
            }
            obj => Err(mismatch("boolean", &obj)),
        }
    }

    fn assert_arr(&self, obj: Object) -> RenderResult<Vec<Object>> {
        match obj {
            Object::Array(a) => Ok(a),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_arr(obj)
            }
            obj => Err(mismatch("array", &obj)),
        }
    }

    fn assert_dict(&self, obj: Object) -> RenderResult<Dictionary> {
        match obj {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(s.dict.clone()),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_dict(obj)
            }
            obj => Err(mismatch("dictionary", &obj)),
        }
    }

    fn assert_stream(&self, obj: Object) -> RenderResult<Arc<StreamObject>> {
        match obj {
            Object::Stream(s) => Ok(s),
            Object::Reference(r) => {
                let obj = self.resolve_reference(r)?;
                self.assert_stream(obj)
            }
            obj => Err(mismatch("stream", &obj)),
        }
    }
}

fn mismatch(expected: &str, found: &Object) -> RenderError {
    RenderError::DecodeError {
        reason: format!("expected {}, found {:?}", expected, found),
    }
}

/// A resolver with no objects behind it. Raw content streams rendered
/// without a document (tests, the debug binary) use this; every indirect
/// reference fails to resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl Resolve for NullResolver {
    fn resolve_reference(&self, reference: Reference) -> RenderResult<Object> {
        Err(RenderError::InvalidReference {
            name: format!("{} {} R", reference.object_number, reference.generation),
        })
    }
}
