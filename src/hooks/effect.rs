//! Effect records and dependency comparison.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::primitives::Cleanup;

bitflags::bitflags! {
    /// Which phase an effect belongs to, and whether it must fire this commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HookFlags: u8 {
        const HAS_EFFECT = 1 << 0;
        const LAYOUT = 1 << 2;
        const PASSIVE = 1 << 3;
    }
}

/// Effect body. Returns the cleanup to run before the next fire or unmount.
pub type EffectCreate = Rc<dyn Fn() -> Option<Cleanup>>;

/// State shared by every render's copy of the same effect: its live cleanup.
#[derive(Default)]
pub struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

impl EffectInstance {
    fn run_destroy(&self) {
        let destroy = self.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    fn run_create(&self, create: &EffectCreate) {
        let destroy = create();
        *self.destroy.borrow_mut() = destroy;
    }
}

/// One effect registered by one render.
#[derive(Clone)]
pub struct Effect {
    pub tag: HookFlags,
    pub create: EffectCreate,
    pub inst: Rc<EffectInstance>,
    pub deps: Option<Rc<dyn Any>>,
}

/// `None` never matches: effects without dependencies fire every commit.
pub fn deps_equal<D: PartialEq + 'static>(next: Option<&D>, prev: Option<&Rc<dyn Any>>) -> bool {
    match (next, prev) {
        (Some(next), Some(prev)) => prev.downcast_ref::<D>() == Some(next),
        _ => false,
    }
}

/// Run cleanups of every effect whose tag contains `flags`.
pub fn commit_unmount(effects: &[Effect], flags: HookFlags) {
    for effect in effects {
        if effect.tag.contains(flags) {
            effect.inst.run_destroy();
        }
    }
}

/// Fire every effect whose tag contains `flags`, keeping its cleanup.
pub fn commit_mount(effects: &[Effect], flags: HookFlags) {
    for effect in effects {
        if effect.tag.contains(flags) {
            effect.inst.run_create(&effect.create);
        }
    }
}
