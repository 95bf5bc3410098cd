//! Non-finite output scanner.
//!
//! `serde_json` silently turns `NaN` and `±inf` into `null`, which would let
//! a defect leak out as a plausible-looking result. Every payload is walked
//! with this serializer first; the first non-finite float aborts the walk
//! and reports its path, e.g. `convergence[]` or `lobes[].depth_mm`.

use serde::Serialize;
use serde::ser;
use std::fmt::Display;

/// Path of the first non-finite float in `value`, if any.
pub fn find_non_finite<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    let mut scanner = Scanner { path: Vec::new() };
    match value.serialize(&mut scanner) {
        Err(ScanError::NonFinite(path)) => Some(path),
        // Non-float serialisation problems surface later, in serde_json.
        Err(ScanError::Other(_)) | Ok(()) => None,
    }
}

#[derive(Debug, thiserror::Error)]
enum ScanError {
    #[error("non-finite value at {0}")]
    NonFinite(String),
    #[error("{0}")]
    Other(String),
}

impl ser::Error for ScanError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Other(msg.to_string())
    }
}

struct Scanner {
    path: Vec<&'static str>,
}

impl Scanner {
    fn check(&self, v: f64) -> Result<(), ScanError> {
        if v.is_finite() {
            return Ok(());
        }
        let mut rendered = String::new();
        for segment in &self.path {
            if *segment == "[]" {
                rendered.push_str(segment);
            } else {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(segment);
            }
        }
        if rendered.is_empty() {
            rendered.push_str("<root>");
        }
        Err(ScanError::NonFinite(rendered))
    }

    fn nested<T: Serialize + ?Sized>(
        &mut self,
        segment: &'static str,
        value: &T,
    ) -> Result<(), ScanError> {
        self.path.push(segment);
        value.serialize(&mut *self)?;
        self.path.pop();
        Ok(())
    }
}

impl<'a> ser::Serializer for &'a mut Scanner {
    type Ok = ();
    type Error = ScanError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), ScanError> {
        self.check(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), ScanError> {
        self.check(v)
    }
    fn serialize_char(self, _: char) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), ScanError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), ScanError> {
        Ok(())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), ScanError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), ScanError> {
        self.nested(variant, value)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self, ScanError> {
        self.path.push("[]");
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, ScanError> {
        self.path.push("[]");
        Ok(self)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, ScanError> {
        self.path.push("[]");
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, ScanError> {
        self.path.push(variant);
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, ScanError> {
        self.path.push("{}");
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, ScanError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Self, ScanError> {
        self.path.push(variant);
        Ok(self)
    }
}

impl ser::SerializeSeq for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ScanError> {
        value.serialize(&mut **self)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}

impl ser::SerializeTuple for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ScanError> {
        value.serialize(&mut **self)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}

impl ser::SerializeTupleStruct for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ScanError> {
        value.serialize(&mut **self)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}

impl ser::SerializeTupleVariant for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ScanError> {
        value.serialize(&mut **self)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}

impl ser::SerializeMap for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), ScanError> {
        key.serialize(&mut **self)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ScanError> {
        value.serialize(&mut **self)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}

impl ser::SerializeStruct for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ScanError> {
        self.nested(key, value)
    }
    fn end(self) -> Result<(), ScanError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for &mut Scanner {
    type Ok = ();
    type Error = ScanError;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ScanError> {
        self.nested(key, value)
    }
    fn end(self) -> Result<(), ScanError> {
        self.path.pop();
        Ok(())
    }
}
