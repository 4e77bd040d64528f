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

//! Little-endian byte buffer primitives used by sketch serialization.
//!
//! The DataSketches binary format is little-endian throughout, so only the
//! LE accessors are exposed here.

use std::io;
use std::io::Cursor;
use std::io::Read;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// Growable output buffer for serializing a sketch.
pub(crate) struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_bytes(&mut self, buf: &[u8]) {
        self.bytes.extend_from_slice(buf);
    }

    // Writing to a Vec cannot fail, so the io::Result from byteorder is
    // discarded at this boundary.

    pub fn write_u8(&mut self, n: u8) {
        let _ = WriteBytesExt::write_u8(&mut self.bytes, n);
    }

    pub fn write_u16(&mut self, n: u16) {
        let _ = self.bytes.write_u16::<LittleEndian>(n);
    }

    pub fn write_u32(&mut self, n: u32) {
        let _ = self.bytes.write_u32::<LittleEndian>(n);
    }

    pub fn write_u64(&mut self, n: u64) {
        let _ = self.bytes.write_u64::<LittleEndian>(n);
    }

    pub fn write_i32(&mut self, n: i32) {
        let _ = self.bytes.write_i32::<LittleEndian>(n);
    }

    pub fn write_i64(&mut self, n: i64) {
        let _ = self.bytes.write_i64::<LittleEndian>(n);
    }

    pub fn write_f32(&mut self, n: f32) {
        let _ = self.bytes.write_f32::<LittleEndian>(n);
    }

    pub fn write_f64(&mut self, n: f64) {
        let _ = self.bytes.write_f64::<LittleEndian>(n);
    }
}

/// Cursor over an input buffer being deserialized.
pub(crate) struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(slice),
        }
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.cursor.read_exact(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        ReadBytesExt::read_u8(&mut self.cursor)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.cursor.read_u16::<LittleEndian>()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.cursor.read_u32::<LittleEndian>()
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        self.cursor.read_u64::<LittleEndian>()
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.cursor.read_i32::<LittleEndian>()
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        self.cursor.read_i64::<LittleEndian>()
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        self.cursor.read_f32::<LittleEndian>()
    }

    pub fn read_f64(&mut self) -> io::Result<f64> {
        self.cursor.read_f64::<LittleEndian>()
    }
}
