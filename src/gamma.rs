// sRGB <-> linear lookup tables for blending anti-aliased stroke edges.
// Visual: a stroke's soft rim fades into the canvas without dark halos.

pub struct GammaLut {
    // sRGB(0..255) -> linear (0..1)
    srgb_to_linear: [f32; 256],
    // linear(0..1) -> sRGB(0..255), quantized to 4096 steps
    linear_to_srgb: [u8; 4096],
}

impl Default for GammaLut {
    fn default() -> Self {
        Self::new()
    }
}

impl GammaLut {
    /// Build both tables once per session.
    pub fn new() -> Self {
        let mut s2l = [0.0f32; 256];
        for (v, slot) in s2l.iter_mut().enumerate() {
            let c = v as f32 / 255.0;
            *slot = if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
        }

        let mut l2s = [0u8; 4096];
        for (i, slot) in l2s.iter_mut().enumerate() {
            let l = i as f32 / 4095.0;
            let s = if l <= 0.003_130_8 { 12.92 * l } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
            *slot = (s * 255.0).round().clamp(0.0, 255.0) as u8;
        }

        Self { srgb_to_linear: s2l, linear_to_srgb: l2s }
    }

    #[inline]
    pub fn to_linear(&self, v: u8) -> f32 {
        self.srgb_to_linear[v as usize]
    }

    #[inline]
    pub fn to_srgb(&self, l: f32) -> u8 {
        let idx = (l.clamp(0.0, 1.0) * 4095.0).round() as usize;
        self.linear_to_srgb[idx]
    }

    /// Cover `dst` with `src` at opacity `alpha` (0..1); both are 0x00RRGGBB.
    pub fn mix(&self, dst: u32, src: u32, alpha: f32) -> u32 {
        if alpha <= 0.0 {
            return dst;
        }
        if alpha >= 1.0 {
            return src;
        }
        let inv = 1.0 - alpha;
        let mut out = 0u32;
        for shift in [16u32, 8, 0] {
            let d = self.to_linear(((dst >> shift) & 0xFF) as u8);
            let s = self.to_linear(((src >> shift) & 0xFF) as u8);
            out |= (self.to_srgb(alpha * s + inv * d) as u32) << shift;
        }
        out
    }
}
