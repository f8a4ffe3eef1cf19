//! Turns rendered page bitmaps into terminal image protocols.
//!
//! Decoded images are cached per page and theme; encoded protocols are cached
//! per placement so an unchanged frame costs no re-encoding.

use std::collections::HashMap;

use folio_core::{PageSize, RgbaBitmap, ViewKind};
use ratatui::layout::Rect;
use ratatui_image::Resize;
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;

use crate::layout::PagePlacement;

/// Copies a bitmap into an owned image, dropping any row padding.
pub fn bitmap_to_image(bitmap: &RgbaBitmap) -> anyhow::Result<image::DynamicImage> {
    let row_bytes = bitmap.width.saturating_mul(4);
    let pixels = if bitmap.stride == row_bytes {
        bitmap.pixels.clone()
    } else {
        let mut packed = Vec::with_capacity(row_bytes.saturating_mul(bitmap.height));
        for row in bitmap.pixels.chunks(bitmap.stride.max(1)).take(bitmap.height) {
            packed.extend_from_slice(row.get(..row_bytes).unwrap_or(row));
        }
        packed
    };
    let image = image::RgbaImage::from_raw(bitmap.width as u32, bitmap.height as u32, pixels)
        .ok_or_else(|| anyhow::anyhow!("invalid RGBA pixel buffer from page render"))?;
    Ok(image::DynamicImage::ImageRgba8(image))
}

/// Cuts the shown part of a page out of its rendered image. Placement clips
/// are in display pixels; the image may have a slightly different size.
pub fn crop_to_placement(
    image: &image::DynamicImage,
    display_width: f32,
    display_height: f32,
    placement: &PagePlacement,
) -> image::DynamicImage {
    let sx = image.width() as f32 / display_width.max(1.0);
    let sy = image.height() as f32 / display_height.max(1.0);
    let x = (placement.clip_left * sx).floor().max(0.0) as u32;
    let y = (placement.clip_top * sy).floor().max(0.0) as u32;
    let x = x.min(image.width().saturating_sub(1));
    let y = y.min(image.height().saturating_sub(1));
    let w = ((placement.clip_width() * sx).ceil() as u32)
        .clamp(1, image.width().saturating_sub(x).max(1));
    let h = ((placement.clip_height() * sy).ceil() as u32)
        .clamp(1, image.height().saturating_sub(y).max(1));
    image.crop_imm(x, y, w, h)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ImageKey {
    kind: ViewKind,
    page: u32,
}

struct DecodedPage {
    generation: u64,
    inverted: bool,
    image: image::DynamicImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlacementKey {
    generation: u64,
    inverted: bool,
    area: Rect,
    clip: [u32; 4],
}

struct EncodedPage {
    key: PlacementKey,
    protocol: ImageProtocol,
}

/// A rendered page together with the state it was rendered for.
#[derive(Clone, Copy)]
pub struct PageSource<'a> {
    pub kind: ViewKind,
    pub generation: u64,
    pub inverted: bool,
    pub bitmap: &'a RgbaBitmap,
    /// Size the page occupies in the layout.
    pub display: PageSize,
}

#[derive(Default)]
pub struct PageImages {
    decoded: HashMap<ImageKey, DecodedPage>,
    encoded: HashMap<ImageKey, EncodedPage>,
}

impl PageImages {
    pub fn clear(&mut self) {
        self.decoded.clear();
        self.encoded.clear();
    }

    /// Drops everything cached for `kind` pages not in `keep`.
    pub fn retain(&mut self, kind: ViewKind, keep: impl Fn(u32) -> bool) {
        self.decoded
            .retain(|key, _| key.kind != kind || keep(key.page));
        self.encoded
            .retain(|key, _| key.kind != kind || keep(key.page));
    }

    pub fn protocol(
        &mut self,
        picker: &Picker,
        source: &PageSource<'_>,
        placement: &PagePlacement,
    ) -> anyhow::Result<&ImageProtocol> {
        let PageSource {
            kind,
            generation,
            inverted,
            bitmap,
            display,
        } = *source;
        let key = ImageKey {
            kind,
            page: placement.page,
        };
        let placement_key = PlacementKey {
            generation,
            inverted,
            area: placement.area,
            clip: [
                placement.clip_left.round() as u32,
                placement.clip_top.round() as u32,
                placement.clip_right.round() as u32,
                placement.clip_bottom.round() as u32,
            ],
        };

        let fresh = self
            .encoded
            .get(&key)
            .is_some_and(|encoded| encoded.key == placement_key);
        if !fresh {
            let stale = self.decoded.get(&key).is_none_or(|decoded| {
                decoded.generation != generation || decoded.inverted != inverted
            });
            if stale {
                let mut image = bitmap_to_image(bitmap)?;
                if inverted {
                    image.invert();
                }
                self.decoded.insert(
                    key,
                    DecodedPage {
                        generation,
                        inverted,
                        image,
                    },
                );
            }
            let decoded = self
                .decoded
                .get(&key)
                .ok_or_else(|| anyhow::anyhow!("decoded page {} missing", placement.page))?;
            let shown =
                crop_to_placement(&decoded.image, display.width, display.height, placement);
            let protocol = picker
                .new_protocol(shown, placement.area, Resize::Fit(None))
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            self.encoded.insert(
                key,
                EncodedPage {
                    key: placement_key,
                    protocol,
                },
            );
        }

        self.encoded
            .get(&key)
            .map(|encoded| &encoded.protocol)
            .ok_or_else(|| anyhow::anyhow!("encoded page {} missing", placement.page))
    }
}
