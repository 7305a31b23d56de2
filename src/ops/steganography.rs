// ============================================================================
// STEGANOGRAPHY: hide text or an image in the low bits of a carrier
// ============================================================================
//
// Stream layout (bits are written MSB-first, byte by byte):
//
//   b'T' | len: u32 BE | UTF-8 bytes
//   b'I' | width: u32 BE | height: u32 BE | RGBA8 bytes
//
// The stream is spread over "slots": one slot per carrier channel per pixel,
// each holding `bits` low bits of the 8-bit quantized channel value. Pixels
// are visited in raster order, or in a key-seeded permutation.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::buffer::{CHANNELS, PixelBuffer};
use crate::error::{EngineError, Result};

const TAG_TEXT: u8 = b'T';
const TAG_IMAGE: u8 = b'I';

pub const DEFAULT_BITS: u8 = 4;
pub const MAX_BITS: u8 = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Payload {
    Text(String),
    Image(PixelBuffer),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StegoParams {
    /// Empty or missing key means raster order.
    pub key: Option<String>,
    /// Low bits replaced per carrier channel, 1..=4.
    pub bits: u8,
    /// Image payloads: traverse row-major instead of column-major.
    pub by_pixel_order: bool,
    /// Use only the red channel as carrier.
    pub only_r_channel: bool,
}

impl Default for StegoParams {
    fn default() -> Self {
        Self { key: None, bits: DEFAULT_BITS, by_pixel_order: true, only_r_channel: false }
    }
}

impl StegoParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BITS).contains(&self.bits) {
            return Err(EngineError::invalid(format!("bits must be in 1..={MAX_BITS} (got {})", self.bits)));
        }
        Ok(())
    }

    fn channels(&self) -> usize {
        if self.only_r_channel { 1 } else { 3 }
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    /// Payload bits the carrier can hold.
    pub fn capacity(&self, carrier: &PixelBuffer) -> usize {
        carrier.pixel_count() * self.bits as usize * self.channels()
    }
}

/// Stable 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn pixel_order(count: usize, key: Option<&str>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..count).collect();
    if let Some(key) = key {
        let mut rng = ChaCha20Rng::seed_from_u64(fnv1a(key.as_bytes()));
        order.shuffle(&mut rng);
    }
    order
}

/// Maps slot numbers to positions in the carrier's raw channel array.
struct Slots {
    order: Vec<usize>,
    channels: usize,
    bits: usize,
}

impl Slots {
    fn new(carrier: &PixelBuffer, params: &StegoParams) -> Self {
        Self {
            order: pixel_order(carrier.pixel_count(), params.key()),
            channels: params.channels(),
            bits: params.bits as usize,
        }
    }

    #[inline]
    fn raw_index(&self, slot: usize) -> usize {
        self.order[slot / self.channels] * CHANNELS + slot % self.channels
    }
}

#[inline]
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn stream_bit(stream: &[u8], pos: usize) -> u8 {
    stream.get(pos / 8).map_or(0, |byte| (byte >> (7 - pos % 8)) & 1)
}

fn serialize(payload: &Payload, params: &StegoParams) -> Result<Vec<u8>> {
    let mut stream = Vec::new();
    match payload {
        Payload::Text(text) => {
            let len = u32::try_from(text.len()).map_err(|_| EngineError::invalid("text payload too long"))?;
            stream.push(TAG_TEXT);
            stream.extend_from_slice(&len.to_be_bytes());
            stream.extend_from_slice(text.as_bytes());
        }
        Payload::Image(img) => {
            let (w, h) = img.dimensions();
            stream.push(TAG_IMAGE);
            stream.extend_from_slice(&w.to_be_bytes());
            stream.extend_from_slice(&h.to_be_bytes());
            let bytes = img.to_rgba8();
            for (x, y) in traversal(w, h, params.by_pixel_order) {
                let i = (y as usize * w as usize + x as usize) * CHANNELS;
                stream.extend_from_slice(&bytes[i..i + CHANNELS]);
            }
        }
    }
    Ok(stream)
}

fn traversal(w: u32, h: u32, by_pixel_order: bool) -> Box<dyn Iterator<Item = (u32, u32)>> {
    if by_pixel_order {
        Box::new((0..h).flat_map(move |y| (0..w).map(move |x| (x, y))))
    } else {
        Box::new((0..w).flat_map(move |x| (0..h).map(move |y| (x, y))))
    }
}

/// Embed `payload` into a copy of `carrier`.
pub fn encode(carrier: &PixelBuffer, payload: &Payload, params: &StegoParams) -> Result<PixelBuffer> {
    params.validate()?;
    let stream = serialize(payload, params)?;
    let required = stream.len() * 8;
    let capacity = params.capacity(carrier);
    if required > capacity {
        return Err(EngineError::PayloadTooLarge { required, capacity });
    }

    let slots = Slots::new(carrier, params);
    let bits = slots.bits;
    let mask: u8 = (1u8 << bits) - 1;
    let mut out = carrier.clone();
    let raw = out.as_raw_mut();
    for slot in 0..required.div_ceil(bits) {
        let mut chunk = 0u8;
        for j in 0..bits {
            chunk = (chunk << 1) | stream_bit(&stream, slot * bits + j);
        }
        let idx = slots.raw_index(slot);
        let q = (quantize(raw[idx]) & !mask) | chunk;
        raw[idx] = q as f32 / 255.0;
    }

    tracing::debug!(required, capacity, bits, keyed = params.key().is_some(), "payload embedded");
    Ok(out)
}

/// Sequential bit reader over a carrier's slots.
struct Reader<'a> {
    raw: &'a [f32],
    slots: Slots,
    pos: usize,
    capacity: usize,
}

impl<'a> Reader<'a> {
    fn new(carrier: &'a PixelBuffer, params: &StegoParams) -> Self {
        Self {
            raw: carrier.as_raw(),
            slots: Slots::new(carrier, params),
            pos: 0,
            capacity: params.capacity(carrier),
        }
    }

    fn remaining(&self) -> usize {
        self.capacity - self.pos
    }

    fn byte(&mut self) -> Result<u8> {
        if self.remaining() < 8 {
            return Err(EngineError::invalid("carrier ends before the hidden payload"));
        }
        let bits = self.slots.bits;
        let mut b = 0u8;
        for _ in 0..8 {
            let slot = self.pos / bits;
            let within = self.pos % bits;
            let value = quantize(self.raw[self.slots.raw_index(slot)]);
            b = (b << 1) | ((value >> (bits - 1 - within)) & 1);
            self.pos += 1;
        }
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        for b in &mut buf {
            *b = self.byte()?;
        }
        Ok(u32::from_be_bytes(buf))
    }

    fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if n.saturating_mul(8) > self.remaining() {
            return Err(EngineError::invalid(format!("hidden length {n} exceeds carrier capacity")));
        }
        (0..n).map(|_| self.byte()).collect()
    }

    fn expect_tag(&mut self, tag: u8) -> Result<()> {
        let found = self.byte()?;
        if found != tag {
            return Err(EngineError::invalid(format!(
                "no hidden {} payload (tag {found:#04x})",
                if tag == TAG_TEXT { "text" } else { "image" }
            )));
        }
        Ok(())
    }
}

pub fn decode_text(carrier: &PixelBuffer, params: &StegoParams) -> Result<String> {
    params.validate()?;
    let mut reader = Reader::new(carrier, params);
    reader.expect_tag(TAG_TEXT)?;
    let len = reader.u32()? as usize;
    let bytes = reader.bytes(len)?;
    String::from_utf8(bytes).map_err(|e| EngineError::invalid(format!("hidden text is not UTF-8: {e}")))
}

pub fn decode_image(carrier: &PixelBuffer, params: &StegoParams) -> Result<PixelBuffer> {
    params.validate()?;
    let mut reader = Reader::new(carrier, params);
    reader.expect_tag(TAG_IMAGE)?;
    let w = reader.u32()?;
    let h = reader.u32()?;
    let len = (w as usize).saturating_mul(h as usize).saturating_mul(CHANNELS);
    if w == 0 || h == 0 {
        return Err(EngineError::invalid(format!("hidden image has size {w}x{h}")));
    }
    let stream = reader.bytes(len)?;

    let mut rgba = vec![0u8; len];
    for ((x, y), px) in traversal(w, h, params.by_pixel_order).zip(stream.chunks_exact(CHANNELS)) {
        let i = (y as usize * w as usize + x as usize) * CHANNELS;
        rgba[i..i + CHANNELS].copy_from_slice(px);
    }
    PixelBuffer::from_rgba8(w, h, &rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::from_fn(w, h, |x, y| {
            [((x * 13 + y * 7) % 256) as f32 / 255.0, 0.5, ((x + y) % 2) as f32, 0.75]
        })
        .unwrap()
    }

    fn params(bits: u8, key: Option<&str>) -> StegoParams {
        StegoParams { key: key.map(str::to_string), bits, ..StegoParams::default() }
    }

    #[test]
    fn test_text_round_trip_with_and_without_key() {
        let c = carrier(16, 16);
        for key in [None, Some("randomsequence!")] {
            let p = params(2, key);
            let stego = encode(&c, &Payload::Text("héllo, world".into()), &p).unwrap();
            assert_eq!(decode_text(&stego, &p).unwrap(), "héllo, world");
        }
    }

    #[test]
    fn test_alpha_is_never_touched() {
        let c = carrier(8, 8);
        let stego = encode(&c, &Payload::Text("abc".into()), &params(4, None)).unwrap();
        for (a, b) in c.as_raw().chunks(4).zip(stego.as_raw().chunks(4)) {
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn test_image_round_trip_both_traversals() {
        let c = carrier(32, 32);
        let secret = PixelBuffer::from_rgba8(3, 2, &(0..24).map(|i| (i * 10) as u8).collect::<Vec<_>>()).unwrap();
        for by_pixel_order in [true, false] {
            let p = StegoParams { by_pixel_order, ..params(4, Some("k")) };
            let stego = encode(&c, &Payload::Image(secret.clone()), &p).unwrap();
            assert_eq!(decode_image(&stego, &p).unwrap(), secret);
        }
    }

    #[test]
    fn test_exact_capacity_fits_and_one_more_byte_fails() {
        // 80 slots of 1 bit = 10 bytes = tag + length + 5 chars
        let c = carrier(10, 8);
        let p = StegoParams { only_r_channel: true, ..params(1, None) };
        assert_eq!(p.capacity(&c), 80);
        let fits = encode(&c, &Payload::Text("12345".into()), &p).unwrap();
        assert_eq!(decode_text(&fits, &p).unwrap(), "12345");
        let err = encode(&c, &Payload::Text("123456".into()), &p).unwrap_err();
        assert!(matches!(err, EngineError::PayloadTooLarge { required: 88, capacity: 80 }));
    }

    #[test]
    fn test_bits_out_of_range_rejected() {
        let c = carrier(4, 4);
        for bits in [0, 5] {
            assert!(encode(&c, &Payload::Text("a".into()), &params(bits, None)).is_err());
        }
    }

    #[test]
    fn test_wrong_tag_is_reported() {
        let c = carrier(16, 16);
        let p = params(4, None);
        let stego = encode(&c, &Payload::Text("hi".into()), &p).unwrap();
        assert!(matches!(decode_image(&stego, &p), Err(EngineError::InvalidOperation(_))));
    }

    #[test]
    fn test_wrong_key_does_not_decode() {
        let c = carrier(16, 16);
        let stego = encode(&c, &Payload::Text("secret".into()), &params(4, Some("right"))).unwrap();
        let decoded = decode_text(&stego, &params(4, Some("wrong")));
        assert!(decoded.map_or(true, |t| t != "secret"));
    }

    #[test]
    fn test_empty_key_means_raster_order() {
        assert_eq!(pixel_order(5, StegoParams { key: Some(String::new()), ..StegoParams::default() }.key()), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_keyed_order_is_stable_permutation() {
        let first = pixel_order(64, Some("orchard"));
        assert_eq!(first, pixel_order(64, Some("orchard")));
        assert_ne!(first, (0..64).collect::<Vec<_>>());
        assert_ne!(first, pixel_order(64, Some("orchards")));
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..64).collect::<Vec<_>>());
        assert_eq!(pixel_order(5, None), vec![0, 1, 2, 3, 4]);
    }
}
