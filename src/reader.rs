use crate::error::RasterError;

/// Big-endian cursor over a font buffer.
///
/// Every accessor is bounds checked against the buffer and fails with
/// `RasterError::MalformedFont` naming the field that could not be read.
/// `push`/`pop` save and restore the cursor so table parsers can jump to an
/// offset and come back.
#[derive(Debug, Clone)]
pub struct TableReader<'a> {
    data: &'a [u8],
    pos: usize,
    saved: Vec<usize>,
}

impl<'a> TableReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            saved: Vec::new(),
        }
    }

    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, RasterError> {
        let mut reader = Self::new(data);
        reader.seek(offset)?;
        Ok(reader)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), RasterError> {
        if offset > self.data.len() {
            return Err(RasterError::MalformedFont(format!(
                "offset {} beyond end of data ({} bytes)",
                offset,
                self.data.len()
            )));
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), RasterError> {
        let target = self
            .pos
            .checked_add(count)
            .ok_or_else(|| RasterError::MalformedFont("skip overflow".to_string()))?;
        self.seek(target)
    }

    /// Saves the current position and moves to `offset`.
    pub fn push(&mut self, offset: usize) -> Result<(), RasterError> {
        let current = self.pos;
        self.seek(offset)?;
        self.saved.push(current);
        Ok(())
    }

    /// Returns to the position saved by the matching `push`.
    pub fn pop(&mut self) {
        if let Some(pos) = self.saved.pop() {
            self.pos = pos;
        }
    }

    pub fn bytes(&mut self, count: usize) -> Result<&'a [u8], RasterError> {
        let end = self.pos.checked_add(count).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(RasterError::MalformedFont(format!(
                "read of {} bytes at offset {} overruns {} byte buffer",
                count,
                self.pos,
                self.data.len()
            )));
        };
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], RasterError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, RasterError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, RasterError> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16, RasterError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16, RasterError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, RasterError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, RasterError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    /// Signed font design units.
    pub fn fword(&mut self) -> Result<i16, RasterError> {
        self.i16()
    }

    /// Unsigned font design units.
    pub fn ufword(&mut self) -> Result<u16, RasterError> {
        self.u16()
    }

    /// 16.16 fixed point.
    pub fn fixed(&mut self) -> Result<f32, RasterError> {
        Ok(self.i32()? as f32 / 65536.0)
    }

    pub fn tag(&mut self) -> Result<[u8; 4], RasterError> {
        self.array()
    }

    /// Length-prefixed byte string (one length byte), as used by Pascal strings.
    pub fn byte_string(&mut self) -> Result<&'a [u8], RasterError> {
        let len = self.u8()? as usize;
        self.bytes(len)
    }
}
