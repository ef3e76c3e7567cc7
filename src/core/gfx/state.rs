//! Cached fixed-function render state.
//!
//! Every setter on the device funnels through [`RenderState::apply`], which
//! reports whether the value actually changed. Only changes reach the backend.

use crate::core::gfx::PackedColor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Always,
    NotEqual,
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FogMode {
    Linear,
    Exp,
    Exp2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: Self = Self {
        r: true,
        g: true,
        b: true,
        a: true,
    };
    pub const NONE: Self = Self {
        r: false,
        g: false,
        b: false,
        a: false,
    };
}

/// A single render-state transition, as handed to a backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StateChange {
    Fog(bool),
    FogColor(PackedColor),
    FogDensity(f32),
    FogEnd(f32),
    FogMode(FogMode),
    AlphaTest(bool),
    AlphaTestFunc(CompareFunc, f32),
    AlphaBlending(bool),
    BlendFunc(BlendFactor, BlendFactor),
    AlphaArgBlend(bool),
    DepthTest(bool),
    DepthWrite(bool),
    DepthTestFunc(CompareFunc),
    FaceCulling(bool),
    ColorWrite(ColorMask),
    ClearColor(PackedColor),
    Texturing(bool),
}

/// Last value requested for each piece of state. `None` means "never set",
/// so the first request always goes through.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderState {
    pub fog: Option<bool>,
    pub fog_color: Option<PackedColor>,
    pub fog_density: Option<f32>,
    pub fog_end: Option<f32>,
    pub fog_mode: Option<FogMode>,
    pub alpha_test: Option<bool>,
    pub alpha_test_func: Option<(CompareFunc, f32)>,
    pub alpha_blending: Option<bool>,
    pub blend_func: Option<(BlendFactor, BlendFactor)>,
    pub alpha_arg_blend: Option<bool>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub depth_test_func: Option<CompareFunc>,
    pub face_culling: Option<bool>,
    pub color_write: Option<ColorMask>,
    pub clear_color: Option<PackedColor>,
    pub texturing: Option<bool>,
}

#[inline(always)]
fn store<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

impl RenderState {
    /// Records `change`. Returns `false` when the value is already in effect.
    pub fn apply(&mut self, change: StateChange) -> bool {
        match change {
            StateChange::Fog(v) => store(&mut self.fog, v),
            StateChange::FogColor(v) => store(&mut self.fog_color, v),
            StateChange::FogDensity(v) => store(&mut self.fog_density, v),
            StateChange::FogEnd(v) => store(&mut self.fog_end, v),
            StateChange::FogMode(v) => store(&mut self.fog_mode, v),
            StateChange::AlphaTest(v) => store(&mut self.alpha_test, v),
            StateChange::AlphaTestFunc(f, r) => store(&mut self.alpha_test_func, (f, r)),
            StateChange::AlphaBlending(v) => store(&mut self.alpha_blending, v),
            StateChange::BlendFunc(s, d) => store(&mut self.blend_func, (s, d)),
            StateChange::AlphaArgBlend(v) => store(&mut self.alpha_arg_blend, v),
            StateChange::DepthTest(v) => store(&mut self.depth_test, v),
            StateChange::DepthWrite(v) => store(&mut self.depth_write, v),
            StateChange::DepthTestFunc(v) => store(&mut self.depth_test_func, v),
            StateChange::FaceCulling(v) => store(&mut self.face_culling, v),
            StateChange::ColorWrite(v) => store(&mut self.color_write, v),
            StateChange::ClearColor(v) => store(&mut self.clear_color, v),
            StateChange::Texturing(v) => store(&mut self.texturing, v),
        }
    }

    /// Every value set so far, in the order a freshly reset device wants them
    /// re-issued.
    pub fn replay(&self) -> Vec<StateChange> {
        let mut out = Vec::with_capacity(17);
        let mut push = |v: Option<StateChange>| out.extend(v);

        push(self.alpha_test.map(StateChange::AlphaTest));
        push(self.alpha_blending.map(StateChange::AlphaBlending));
        push(self.alpha_test_func.map(|(f, r)| StateChange::AlphaTestFunc(f, r)));
        push(self.blend_func.map(|(s, d)| StateChange::BlendFunc(s, d)));
        push(self.alpha_arg_blend.map(StateChange::AlphaArgBlend));

        push(self.fog.map(StateChange::Fog));
        push(self.fog_color.map(StateChange::FogColor));
        push(self.fog_density.map(StateChange::FogDensity));
        push(self.fog_end.map(StateChange::FogEnd));
        push(self.fog_mode.map(StateChange::FogMode));

        push(self.depth_test_func.map(StateChange::DepthTestFunc));
        push(self.depth_test.map(StateChange::DepthTest));
        push(self.depth_write.map(StateChange::DepthWrite));

        push(self.face_culling.map(StateChange::FaceCulling));
        push(self.color_write.map(StateChange::ColorWrite));
        push(self.clear_color.map(StateChange::ClearColor));
        push(self.texturing.map(StateChange::Texturing));
        out
    }

    #[inline(always)]
    pub fn fog_enabled(&self) -> bool {
        self.fog.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{CompareFunc, RenderState, StateChange};
    use crate::core::gfx::PackedColor;

    #[test]
    fn repeated_values_are_filtered() {
        let mut state = RenderState::default();
        assert!(state.apply(StateChange::DepthTest(true)));
        assert!(!state.apply(StateChange::DepthTest(true)));
        assert!(state.apply(StateChange::DepthTest(false)));

        assert!(state.apply(StateChange::AlphaTestFunc(CompareFunc::Greater, 0.5)));
        assert!(!state.apply(StateChange::AlphaTestFunc(CompareFunc::Greater, 0.5)));
        assert!(state.apply(StateChange::AlphaTestFunc(CompareFunc::Greater, 0.25)));
    }

    #[test]
    fn replay_lists_each_set_value_once() {
        let mut state = RenderState::default();
        state.apply(StateChange::FogColor(PackedColor::rgb(1, 2, 3)));
        state.apply(StateChange::DepthTest(true));
        state.apply(StateChange::DepthTest(true));
        state.apply(StateChange::FogEnd(128.0));

        let replay = state.replay();
        assert_eq!(
            replay,
            vec![
                StateChange::FogColor(PackedColor::rgb(1, 2, 3)),
                StateChange::FogEnd(128.0),
                StateChange::DepthTest(true),
            ]
        );
    }

    #[test]
    fn fog_defaults_to_off() {
        let mut state = RenderState::default();
        assert!(!state.fog_enabled());
        state.apply(StateChange::Fog(true));
        assert!(state.fog_enabled());
    }
}
