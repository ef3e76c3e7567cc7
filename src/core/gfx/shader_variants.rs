//! Fixed-function emulation for the shader pipeline: four lazily compiled
//! programs keyed by {textured, alpha-tested}, with per-program dirty
//! uniform tracking.

use crate::core::gfx::error::GfxResult;
use bitflags::bitflags;
use glam::Mat4;
use log::debug;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ShaderFeatures: u8 {
        const ALPHA_TEST = 1 << 0;
        const TEXTURED   = 1 << 1;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DirtyUniforms: u8 {
        const MVP = 1 << 0;
    }
}

/// Attribute slots bound before linking, shared by every variant.
pub const ATTRIB_POS: u32 = 0;
pub const ATTRIB_COL: u32 = 1;
pub const ATTRIB_UV: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    Colored,
    ColoredAlphaTest,
    Textured,
    TexturedAlphaTest,
}

impl ShaderVariant {
    pub const ALL: [Self; 4] = [
        Self::Colored,
        Self::ColoredAlphaTest,
        Self::Textured,
        Self::TexturedAlphaTest,
    ];

    #[inline(always)]
    pub const fn select(textured: bool, alpha_test: bool) -> Self {
        match (textured, alpha_test) {
            (false, false) => Self::Colored,
            (false, true) => Self::ColoredAlphaTest,
            (true, false) => Self::Textured,
            (true, true) => Self::TexturedAlphaTest,
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn features(self) -> ShaderFeatures {
        ShaderFeatures::from_bits_truncate(self as u8)
    }

    pub fn vertex_source(self) -> String {
        let uv = self.features().contains(ShaderFeatures::TEXTURED);
        let mut src = String::with_capacity(320);
        src.push_str("attribute vec3 in_pos;\n");
        src.push_str("attribute vec4 in_col;\n");
        if uv {
            src.push_str("attribute vec2 in_uv;\n");
        }
        src.push_str("varying vec4 out_col;\n");
        if uv {
            src.push_str("varying vec2 out_uv;\n");
        }
        src.push_str("uniform mat4 mvp;\n");
        src.push_str("void main() {\n");
        src.push_str("  gl_Position = mvp * vec4(in_pos, 1.0);\n");
        src.push_str("  out_col = in_col;\n");
        if uv {
            src.push_str("  out_uv  = in_uv;\n");
        }
        src.push('}');
        src
    }

    pub fn fragment_source(self) -> String {
        let features = self.features();
        let uv = features.contains(ShaderFeatures::TEXTURED);
        let mut src = String::with_capacity(320);
        src.push_str("precision highp float;\n");
        src.push_str("varying vec4 out_col;\n");
        if uv {
            src.push_str("varying vec2 out_uv;\n");
            src.push_str("uniform sampler2D texImage;\n");
        }
        src.push_str("void main() {\n");
        if uv {
            src.push_str("  vec4 col = texture2D(texImage, out_uv) * out_col;\n");
        } else {
            src.push_str("  vec4 col = out_col;\n");
        }
        if features.contains(ShaderFeatures::ALPHA_TEST) {
            src.push_str("  if (col.a < 0.5) discard;\n");
        }
        src.push_str("  gl_FragColor = col;\n");
        src.push('}');
        src
    }
}

/// The GPU side of program management.
pub trait ProgramApi {
    type Program: Copy + PartialEq;
    type Location: Clone;

    /// Compiles and links `variant`, returning the program and its `mvp`
    /// location. Fails with the driver's log on any stage.
    fn compile(&mut self, variant: ShaderVariant) -> GfxResult<(Self::Program, Option<Self::Location>)>;
    fn use_program(&mut self, program: Self::Program);
    fn upload_mvp(&mut self, location: &Self::Location, mvp: &Mat4);
    fn delete_program(&mut self, program: Self::Program);
}

#[derive(Clone, Debug)]
struct Slot<P, L> {
    program: Option<P>,
    mvp: Option<L>,
    dirty: DirtyUniforms,
}

impl<P, L> Default for Slot<P, L> {
    fn default() -> Self {
        Self {
            program: None,
            mvp: None,
            dirty: DirtyUniforms::all(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderVariants<P, L> {
    slots: [Slot<P, L>; 4],
    active: Option<ShaderVariant>,
}

impl<P, L> Default for ShaderVariants<P, L> {
    fn default() -> Self {
        Self {
            slots: Default::default(),
            active: None,
        }
    }
}

impl<P: Copy + PartialEq, L: Clone> ShaderVariants<P, L> {
    #[inline(always)]
    pub const fn active(&self) -> Option<ShaderVariant> {
        self.active
    }

    pub fn is_compiled(&self, variant: ShaderVariant) -> bool {
        self.slots[variant.index()].program.is_some()
    }

    /// Makes `variant` current, compiling it on first use. Returns whether
    /// the bound program changed.
    pub fn select<A>(&mut self, api: &mut A, variant: ShaderVariant, mvp: &Mat4) -> GfxResult<bool>
    where
        A: ProgramApi<Program = P, Location = L>,
    {
        if self.active == Some(variant) {
            return Ok(false);
        }
        let slot = &mut self.slots[variant.index()];
        let program = match slot.program {
            Some(p) => p,
            None => {
                debug!("Compiling {variant:?} shader program.");
                let (p, loc) = api.compile(variant)?;
                slot.program = Some(p);
                slot.mvp = loc;
                slot.dirty = DirtyUniforms::all();
                p
            }
        };
        api.use_program(program);
        self.active = Some(variant);
        self.reload_uniforms(api, mvp);
        Ok(true)
    }

    /// Flags `uniform` stale on every program.
    pub fn mark_dirty(&mut self, uniform: DirtyUniforms) {
        for slot in &mut self.slots {
            slot.dirty |= uniform;
        }
    }

    /// Sends stale uniforms of the active program.
    pub fn reload_uniforms<A>(&mut self, api: &mut A, mvp: &Mat4)
    where
        A: ProgramApi<Program = P, Location = L>,
    {
        let Some(active) = self.active else {
            return;
        };
        let slot = &mut self.slots[active.index()];
        if slot.dirty.contains(DirtyUniforms::MVP) {
            if let Some(loc) = &slot.mvp {
                api.upload_mvp(loc, mvp);
            }
            slot.dirty.remove(DirtyUniforms::MVP);
        }
    }

    /// Forgets every program without touching the GPU (the context that
    /// owned them is gone).
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn destroy<A>(&mut self, api: &mut A)
    where
        A: ProgramApi<Program = P, Location = L>,
    {
        for slot in &mut self.slots {
            if let Some(p) = slot.program.take() {
                api.delete_program(p);
            }
        }
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DirtyUniforms, ProgramApi, ShaderFeatures, ShaderVariant, ShaderVariants,
    };
    use crate::core::gfx::error::{GfxError, GfxResult, ShaderStage};
    use glam::Mat4;

    #[derive(Default)]
    struct FakeApi {
        compiled: Vec<ShaderVariant>,
        used: Vec<u32>,
        uploads: Vec<(u32, Mat4)>,
        fail: bool,
    }

    impl ProgramApi for FakeApi {
        type Program = u32;
        type Location = u32;

        fn compile(&mut self, variant: ShaderVariant) -> GfxResult<(u32, Option<u32>)> {
            if self.fail {
                return Err(GfxError::ShaderCompile {
                    stage: ShaderStage::Fragment,
                    log: "boom".into(),
                });
            }
            self.compiled.push(variant);
            let id = 10 + variant.index() as u32;
            Ok((id, Some(id * 100)))
        }
        fn use_program(&mut self, program: u32) {
            self.used.push(program);
        }
        fn upload_mvp(&mut self, location: &u32, mvp: &Mat4) {
            self.uploads.push((*location, *mvp));
        }
        fn delete_program(&mut self, _program: u32) {}
    }

    #[test]
    fn variants_are_indexed_by_feature_bits() {
        for (i, v) in ShaderVariant::ALL.into_iter().enumerate() {
            assert_eq!(v.index(), i);
            assert_eq!(v.features().bits() as usize, i);
        }
        assert_eq!(
            ShaderVariant::select(true, true).features(),
            ShaderFeatures::TEXTURED | ShaderFeatures::ALPHA_TEST
        );
    }

    #[test]
    fn programs_compile_once_and_switch_only_on_change() {
        let mut api = FakeApi::default();
        let mut cache = ShaderVariants::default();
        let mvp = Mat4::IDENTITY;

        assert!(cache.select(&mut api, ShaderVariant::Colored, &mvp).unwrap());
        assert!(!cache.select(&mut api, ShaderVariant::Colored, &mvp).unwrap());
        assert!(cache.select(&mut api, ShaderVariant::Textured, &mvp).unwrap());
        assert!(cache.select(&mut api, ShaderVariant::Colored, &mvp).unwrap());

        assert_eq!(api.compiled, vec![ShaderVariant::Colored, ShaderVariant::Textured]);
        assert_eq!(api.used, vec![10, 12, 10]);
    }

    #[test]
    fn dirty_mvp_is_resent_to_the_next_program() {
        let mut api = FakeApi::default();
        let mut cache = ShaderVariants::default();
        let first = Mat4::IDENTITY;
        cache.select(&mut api, ShaderVariant::Colored, &first).unwrap();
        cache.select(&mut api, ShaderVariant::Textured, &first).unwrap();
        api.uploads.clear();

        let moved = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        cache.mark_dirty(DirtyUniforms::MVP);
        cache.reload_uniforms(&mut api, &moved);
        assert_eq!(api.uploads, vec![(1200, moved)], "active program gets it now");

        cache.select(&mut api, ShaderVariant::Colored, &moved).unwrap();
        assert_eq!(api.uploads.last(), Some(&(1000, moved)), "the other on switch");

        cache.reload_uniforms(&mut api, &moved);
        assert_eq!(api.uploads.len(), 2, "clean uniforms are not resent");
    }

    #[test]
    fn compile_failure_leaves_the_slot_empty() {
        let mut api = FakeApi {
            fail: true,
            ..FakeApi::default()
        };
        let mut cache: ShaderVariants<u32, u32> = ShaderVariants::default();
        assert!(cache
            .select(&mut api, ShaderVariant::TexturedAlphaTest, &Mat4::IDENTITY)
            .is_err());
        assert!(!cache.is_compiled(ShaderVariant::TexturedAlphaTest));
        assert_eq!(cache.active(), None);
    }

    #[test]
    fn generated_sources_follow_features() {
        let vs = ShaderVariant::Colored.vertex_source();
        assert!(!vs.contains("in_uv"));
        let fs = ShaderVariant::TexturedAlphaTest.fragment_source();
        assert!(fs.contains("texture2D(texImage, out_uv)"));
        assert!(fs.contains("discard"));
        assert!(!ShaderVariant::Textured.fragment_source().contains("discard"));
    }

    #[test]
    fn invalidate_forces_recompilation() {
        let mut api = FakeApi::default();
        let mut cache = ShaderVariants::default();
        cache.select(&mut api, ShaderVariant::Colored, &Mat4::IDENTITY).unwrap();
        cache.invalidate();
        assert!(!cache.is_compiled(ShaderVariant::Colored));
        cache.select(&mut api, ShaderVariant::Colored, &Mat4::IDENTITY).unwrap();
        assert_eq!(api.compiled.len(), 2);
    }
}
