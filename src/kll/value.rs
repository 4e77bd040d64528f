// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::cmp::Ordering;

use crate::codec::ByteReader;
use crate::codec::ByteWriter;
use crate::error::Error;

/// Capabilities a value type must provide to be stored in a KLL sketch:
/// a total order, a "missing" sentinel check, and a byte encoding matching
/// the DataSketches serde for that type.
pub(crate) trait KllValue: Clone {
    /// Compare two values.
    fn compare(a: &Self, b: &Self) -> Ordering;

    /// Returns true for values that cannot be ordered (NaN for floats).
    fn is_nan(_value: &Self) -> bool {
        false
    }

    /// Encoded size of the value in bytes.
    fn encoded_size(value: &Self) -> usize;

    /// Encode a single value into the output buffer.
    fn encode(value: &Self, out: &mut ByteWriter);

    /// Decode a single value from the input.
    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error>;
}

impl KllValue for f32 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
    }

    fn is_nan(value: &Self) -> bool {
        value.is_nan()
    }

    fn encoded_size(_value: &Self) -> usize {
        4
    }

    fn encode(value: &Self, out: &mut ByteWriter) {
        out.write_f32(*value);
    }

    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error> {
        input.read_f32().map_err(|e| Error::truncated("f32 item").set_source(e))
    }
}

impl KllValue for f64 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.partial_cmp(b).unwrap_or(Ordering::Greater)
    }

    fn is_nan(value: &Self) -> bool {
        value.is_nan()
    }

    fn encoded_size(_value: &Self) -> usize {
        8
    }

    fn encode(value: &Self, out: &mut ByteWriter) {
        out.write_f64(*value);
    }

    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error> {
        input.read_f64().map_err(|e| Error::truncated("f64 item").set_source(e))
    }
}

impl KllValue for i32 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn encoded_size(_value: &Self) -> usize {
        4
    }

    fn encode(value: &Self, out: &mut ByteWriter) {
        out.write_i32(*value);
    }

    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error> {
        input.read_i32().map_err(|e| Error::truncated("i32 item").set_source(e))
    }
}

impl KllValue for i64 {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn encoded_size(_value: &Self) -> usize {
        8
    }

    fn encode(value: &Self, out: &mut ByteWriter) {
        out.write_i64(*value);
    }

    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error> {
        input.read_i64().map_err(|e| Error::truncated("i64 item").set_source(e))
    }
}

impl KllValue for String {
    fn compare(a: &Self, b: &Self) -> Ordering {
        a.cmp(b)
    }

    fn encoded_size(value: &Self) -> usize {
        4 + value.len()
    }

    fn encode(value: &Self, out: &mut ByteWriter) {
        out.write_u32(value.len() as u32);
        out.write_bytes(value.as_bytes());
    }

    fn decode(input: &mut ByteReader<'_>) -> Result<Self, Error> {
        let len = input
            .read_u32()
            .map_err(|e| Error::truncated("string length").set_source(e))?
            as usize;
        let mut buf = vec![0u8; len];
        input
            .read_bytes(&mut buf)
            .map_err(|e| Error::truncated("string bytes").set_source(e))?;
        String::from_utf8(buf)
            .map_err(|e| Error::malformed("string item is not valid UTF-8").set_source(e))
    }
}
