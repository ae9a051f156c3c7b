// src/engine/region.rs
//
// Rectangles and owned sample blocks addressed in image coordinates.

/// Axis-aligned rectangle in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Rect::new(x, y, right - x, bottom - y))
    }

    /// Grow by `margin` on every side, clipped to `bounds`.
    pub fn expand(&self, margin: u32, bounds: &Rect) -> Rect {
        let x = self.x.saturating_sub(margin).max(bounds.x);
        let y = self.y.saturating_sub(margin).max(bounds.y);
        let right = self.right().saturating_add(margin).min(bounds.right());
        let bottom = self.bottom().saturating_add(margin).min(bounds.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Move by a signed offset and clip to `bounds`; `None` when nothing is left.
    pub fn translate_clipped(&self, dx: i64, dy: i64, bounds: &Rect) -> Option<Rect> {
        let left = (self.x as i64 + dx).max(bounds.x as i64);
        let top = (self.y as i64 + dy).max(bounds.y as i64);
        let right = (self.right() as i64 + dx).min(bounds.right() as i64);
        let bottom = (self.bottom() as i64 + dy).min(bounds.bottom() as i64);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Split into horizontal strips of at most `rows` rows.
    pub fn strips(&self, rows: u32) -> Vec<Rect> {
        let rows = rows.max(1);
        let mut out = Vec::with_capacity(self.height.div_ceil(rows) as usize);
        let mut y = self.y;
        while y < self.bottom() {
            let h = rows.min(self.bottom() - y);
            out.push(Rect::new(self.x, y, self.width, h));
            y += h;
        }
        out
    }
}

/// Interleaved `f32` samples covering `rect`, `bands` samples per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    rect: Rect,
    bands: usize,
    data: Vec<f32>,
}

impl Region {
    pub fn new(rect: Rect, bands: usize) -> Self {
        Self {
            rect,
            bands,
            data: vec![0.0; rect.area() * bands],
        }
    }

    /// Wrap existing samples; `None` when the length does not match.
    pub fn from_samples(rect: Rect, bands: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rect.area() * bands).then_some(Self { rect, bands, data })
    }

    pub fn from_fn(rect: Rect, bands: usize, mut f: impl FnMut(u32, u32, usize) -> f32) -> Self {
        let mut region = Self::new(rect, bands);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let px = region.pixel_mut(x, y);
                for (b, sample) in px.iter_mut().enumerate() {
                    *sample = f(x, y, b);
                }
            }
        }
        region
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x >= self.rect.x && x < self.rect.right());
        debug_assert!(y >= self.rect.y && y < self.rect.bottom());
        ((y - self.rect.y) as usize * self.rect.width as usize + (x - self.rect.x) as usize)
            * self.bands
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let i = self.index(x, y);
        &self.data[i..i + self.bands]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [f32] {
        let i = self.index(x, y);
        let bands = self.bands;
        &mut self.data[i..i + bands]
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, band: usize) -> f32 {
        self.data[self.index(x, y) + band]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, band: usize, value: f32) {
        let i = self.index(x, y) + band;
        self.data[i] = value;
    }

    /// Copy of the samples inside `rect` (which must lie within this region).
    pub fn crop(&self, rect: Rect) -> Region {
        debug_assert!(self.rect.contains_rect(&rect));
        let mut out = Region::new(rect, self.bands);
        let row_len = rect.width as usize * self.bands;
        for y in rect.y..rect.bottom() {
            let src = self.index(rect.x, y);
            let dst = out.index(rect.x, y);
            out.data[dst..dst + row_len].copy_from_slice(&self.data[src..src + row_len]);
        }
        out
    }

    /// Copy `other` into the overlapping part of this region.
    pub fn paste(&mut self, other: &Region) {
        debug_assert_eq!(self.bands, other.bands);
        let Some(overlap) = self.rect.intersect(&other.rect) else {
            return;
        };
        let row_len = overlap.width as usize * self.bands;
        for y in overlap.y..overlap.bottom() {
            let src = other.index(overlap.x, y);
            let dst = self.index(overlap.x, y);
            self.data[dst..dst + row_len].copy_from_slice(&other.data[src..src + row_len]);
        }
    }

    /// Same samples, addressed as if the region started at `(x, y)`.
    pub fn relocated(mut self, x: u32, y: u32) -> Region {
        self.rect.x = x;
        self.rect.y = y;
        self
    }

    pub fn map_in_place(&mut self, mut f: impl FnMut(usize, f32) -> f32) {
        let bands = self.bands;
        for (i, sample) in self.data.iter_mut().enumerate() {
            *sample = f(i % bands, *sample);
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.bands.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.intersect(&Rect::new(10, 0, 3, 3)), None);
    }

    #[test]
    fn test_expand_clips_to_bounds() {
        let bounds = Rect::of_size(20, 20);
        assert_eq!(
            Rect::new(1, 18, 4, 2).expand(3, &bounds),
            Rect::new(0, 15, 8, 5)
        );
    }

    #[test]
    fn test_translate_clipped() {
        let bounds = Rect::of_size(4, 4);
        assert_eq!(
            Rect::new(0, 0, 6, 6).translate_clipped(-2, -3, &bounds),
            Some(Rect::new(0, 0, 4, 3))
        );
        assert_eq!(Rect::new(0, 0, 2, 2).translate_clipped(10, 0, &bounds), None);
    }

    #[test]
    fn test_strips_cover_rect() {
        let strips = Rect::new(0, 3, 5, 10).strips(4);
        assert_eq!(
            strips,
            vec![
                Rect::new(0, 3, 5, 4),
                Rect::new(0, 7, 5, 4),
                Rect::new(0, 11, 5, 2)
            ]
        );
    }

    #[test]
    fn test_crop_and_paste_round_trip() {
        let full = Region::from_fn(Rect::of_size(4, 3), 2, |x, y, b| (x * 10 + y) as f32 + b as f32 / 10.0);
        let part = full.crop(Rect::new(1, 1, 2, 2));
        assert_eq!(part.get(2, 2, 1), full.get(2, 2, 1));

        let mut blank = Region::new(Rect::of_size(4, 3), 2);
        blank.paste(&part);
        assert_eq!(blank.get(1, 1, 0), full.get(1, 1, 0));
        assert_eq!(blank.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_from_samples_checks_length() {
        assert!(Region::from_samples(Rect::of_size(2, 2), 3, vec![0.0; 11]).is_none());
        assert!(Region::from_samples(Rect::of_size(2, 2), 3, vec![0.0; 12]).is_some());
    }
}
