//! Type-tagged attachment streams
//!
//! Every value in a message body is preceded by a one-byte tag naming its
//! type. Integers and floats are little-endian. Strings, regions and byte
//! blobs carry a `u32` length (or rectangle count) before their payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ProtocolError;
use crate::geometry::{Point, PointF, Rect, RectF, Rgba};
use crate::region::Region;

/// Longest string accepted from a client.
pub const MAX_STRING_LEN: usize = 64 * 1024;
/// Most rectangles accepted in one region attachment.
pub const MAX_REGION_RECTS: usize = 64 * 1024;
/// Largest opaque byte attachment.
pub const MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    I32 = 1,
    U32 = 2,
    F32 = 3,
    Bool = 4,
    Point = 5,
    PointF = 6,
    Rect = 7,
    RectF = 8,
    Color = 9,
    String = 10,
    Region = 11,
    SyncData = 12,
    Bytes = 13,
}

/// Rendezvous identifiers of a direct window session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct SyncData {
    pub area_id: i32,
    pub acquire_sem: i32,
    pub release_sem: i32,
}

/// Builds an attachment stream.
#[derive(Debug, Default, Clone)]
pub struct AttachmentWriter {
    buf: Vec<u8>,
}

// Writes into a Vec cannot fail.
impl AttachmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self, tag: Tag) -> &mut Self {
        self.buf.push(tag as u8);
        self
    }

    fn raw_i32(&mut self, value: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(value);
    }

    fn raw_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    fn raw_f32(&mut self, value: f32) {
        let _ = self.buf.write_f32::<LittleEndian>(value);
    }

    fn raw_rect(&mut self, rect: &Rect) {
        self.raw_i32(rect.left);
        self.raw_i32(rect.top);
        self.raw_i32(rect.right);
        self.raw_i32(rect.bottom);
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.tag(Tag::I32).raw_i32(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.tag(Tag::U32).raw_u32(value);
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.tag(Tag::F32).raw_f32(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.tag(Tag::Bool).buf.push(value as u8);
        self
    }

    pub fn point(&mut self, point: Point) -> &mut Self {
        self.tag(Tag::Point).raw_i32(point.x);
        self.raw_i32(point.y);
        self
    }

    pub fn point_f(&mut self, point: PointF) -> &mut Self {
        self.tag(Tag::PointF).raw_f32(point.x);
        self.raw_f32(point.y);
        self
    }

    pub fn rect(&mut self, rect: Rect) -> &mut Self {
        self.tag(Tag::Rect).raw_rect(&rect);
        self
    }

    pub fn rect_f(&mut self, rect: RectF) -> &mut Self {
        self.tag(Tag::RectF);
        for v in [rect.left, rect.top, rect.right, rect.bottom] {
            self.raw_f32(v);
        }
        self
    }

    pub fn color(&mut self, color: Rgba) -> &mut Self {
        self.tag(Tag::Color)
            .buf
            .extend_from_slice(&[color.red, color.green, color.blue, color.alpha]);
        self
    }

    pub fn string(&mut self, text: &str) -> &mut Self {
        self.tag(Tag::String).raw_u32(text.len() as u32);
        self.buf.extend_from_slice(text.as_bytes());
        self
    }

    pub fn region(&mut self, region: &Region) -> &mut Self {
        self.tag(Tag::Region).raw_u32(region.count() as u32);
        for rect in region.rects() {
            self.raw_rect(rect);
        }
        self
    }

    pub fn sync_data(&mut self, sync: SyncData) -> &mut Self {
        self.tag(Tag::SyncData).raw_i32(sync.area_id);
        self.raw_i32(sync.acquire_sem);
        self.raw_i32(sync.release_sem);
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.tag(Tag::Bytes).raw_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads an attachment stream in order.
#[derive(Debug, Clone)]
pub struct AttachmentReader<'a> {
    data: &'a [u8],
}

impl<'a> AttachmentReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingData(self.data.len()))
        }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.data.len() < n {
            Err(ProtocolError::Truncated {
                needed: n - self.data.len(),
            })
        } else {
            Ok(())
        }
    }

    fn expect(&mut self, tag: Tag) -> Result<(), ProtocolError> {
        self.need(1)?;
        let found = self.data[0];
        if found != tag as u8 {
            return Err(ProtocolError::UnexpectedTag {
                expected: tag as u8,
                found,
            });
        }
        self.data = &self.data[1..];
        Ok(())
    }

    fn raw_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        self.data
            .read_i32::<LittleEndian>()
            .map_err(|_| ProtocolError::Truncated { needed: 4 })
    }

    fn raw_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        self.data
            .read_u32::<LittleEndian>()
            .map_err(|_| ProtocolError::Truncated { needed: 4 })
    }

    fn raw_f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        self.data
            .read_f32::<LittleEndian>()
            .map_err(|_| ProtocolError::Truncated { needed: 4 })
    }

    fn raw_rect(&mut self) -> Result<Rect, ProtocolError> {
        let rect = Rect::new(self.raw_i32()?, self.raw_i32()?, self.raw_i32()?, self.raw_i32()?);
        Ok(rect.clamped())
    }

    fn raw_len(&mut self, limit: usize) -> Result<usize, ProtocolError> {
        let len = self.raw_u32()? as usize;
        if len > limit {
            return Err(ProtocolError::TooLarge(len));
        }
        Ok(len)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.need(n)?;
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.expect(Tag::I32)?;
        self.raw_i32()
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.expect(Tag::U32)?;
        self.raw_u32()
    }

    pub fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.expect(Tag::F32)?;
        self.raw_f32()
    }

    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        self.expect(Tag::Bool)?;
        Ok(self.take(1)?[0] != 0)
    }

    pub fn point(&mut self) -> Result<Point, ProtocolError> {
        self.expect(Tag::Point)?;
        Ok(Point::new(self.raw_i32()?, self.raw_i32()?).clamped())
    }

    pub fn point_f(&mut self) -> Result<PointF, ProtocolError> {
        self.expect(Tag::PointF)?;
        Ok(PointF::new(self.raw_f32()?, self.raw_f32()?))
    }

    pub fn rect(&mut self) -> Result<Rect, ProtocolError> {
        self.expect(Tag::Rect)?;
        self.raw_rect()
    }

    pub fn rect_f(&mut self) -> Result<RectF, ProtocolError> {
        self.expect(Tag::RectF)?;
        Ok(RectF::new(
            self.raw_f32()?,
            self.raw_f32()?,
            self.raw_f32()?,
            self.raw_f32()?,
        ))
    }

    pub fn color(&mut self) -> Result<Rgba, ProtocolError> {
        self.expect(Tag::Color)?;
        let c = self.take(4)?;
        Ok(Rgba::new(c[0], c[1], c[2], c[3]))
    }

    pub fn string(&mut self) -> Result<String, ProtocolError> {
        self.expect(Tag::String)?;
        let len = self.raw_len(MAX_STRING_LEN)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn region(&mut self) -> Result<Region, ProtocolError> {
        self.expect(Tag::Region)?;
        let count = self.raw_len(MAX_REGION_RECTS)?;
        self.need(count * 16)?;
        let mut rects = Vec::with_capacity(count);
        for _ in 0..count {
            rects.push(self.raw_rect()?);
        }
        Ok(Region::from_rects(rects))
    }

    pub fn sync_data(&mut self) -> Result<SyncData, ProtocolError> {
        self.expect(Tag::SyncData)?;
        Ok(SyncData {
            area_id: self.raw_i32()?,
            acquire_sem: self.raw_i32()?,
            release_sem: self.raw_i32()?,
        })
    }

    pub fn bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        self.expect(Tag::Bytes)?;
        let len = self.raw_len(MAX_BYTES_LEN)?;
        self.take(len)
    }
}
