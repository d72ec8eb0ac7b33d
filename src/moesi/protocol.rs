//! The MOESI decision table.
//!
//! `transition` is a pure function of the current line state and the event that
//! hit the line. The cache applies the returned [`Transition`]; nothing in here
//! touches storage or the bus.

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoherenceState {
    Modified,
    Owned,
    Exclusive,
    Shared,
    #[default]
    Invalid,
}

impl CoherenceState {
    pub fn is_valid(&self) -> bool {
        *self != CoherenceState::Invalid
    }
    /// memory is stale and this cache is responsible for writing the line back
    pub fn is_dirty(&self) -> bool {
        matches!(self, CoherenceState::Modified | CoherenceState::Owned)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    ProcessorRead,
    ProcessorWrite,
    SnoopedBusRd,
    SnoopedBusRdX,
    SnoopedBusUpgr,
}

/// what the cache has to put on the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusAction {
    None,
    BusRd,
    BusRdX,
    BusUpgr,
    /// supply the line to the requester of the snooped transaction
    Flush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataAction {
    None,
    /// read or write the requested word of the resident line
    Access,
    /// the line has to be brought in (by a flush or from memory) before the access
    Fill,
    /// hand the line data to the requester
    Supply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    Keep,
    Go(CoherenceState),
    /// Shared if another cache answered the read, Exclusive otherwise
    ByResponse,
}

impl Next {
    pub fn resolve(self, current: CoherenceState, shared: bool) -> CoherenceState {
        match self {
            Next::Keep => current,
            Next::Go(s) => s,
            Next::ByResponse if shared => CoherenceState::Shared,
            Next::ByResponse => CoherenceState::Exclusive,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: Next,
    pub bus: BusAction,
    pub data: DataAction,
}

impl Transition {
    const NOOP: Transition = Transition { next: Next::Keep, bus: BusAction::None, data: DataAction::None };
    const HIT: Transition = Transition { next: Next::Keep, bus: BusAction::None, data: DataAction::Access };

    fn go(next: CoherenceState, bus: BusAction, data: DataAction) -> Self {
        Transition { next: Next::Go(next), bus, data }
    }
    fn flush_then(next: Next) -> Self {
        Transition { next, bus: BusAction::Flush, data: DataAction::Supply }
    }
    pub fn is_noop(&self) -> bool {
        *self == Self::NOOP
    }
}

pub fn transition(state: CoherenceState, trigger: Trigger) -> Transition {
    use BusAction as B;
    use CoherenceState::*;
    use DataAction as D;
    use Trigger::*;
    match (state, trigger) {
        // misses
        (Invalid, ProcessorRead) => Transition { next: Next::ByResponse, bus: B::BusRd, data: D::Fill },
        (Invalid, ProcessorWrite) => Transition::go(Modified, B::BusRdX, D::Fill),
        (Invalid, _) => Transition::NOOP,

        // read hits
        (Shared | Exclusive | Owned | Modified, ProcessorRead) => Transition::HIT,

        // write hits
        (Shared | Owned, ProcessorWrite) => Transition::go(Modified, B::BusUpgr, D::Access),
        (Exclusive, ProcessorWrite) => Transition::go(Modified, B::None, D::Access),
        (Modified, ProcessorWrite) => Transition::HIT,

        // snooped reads
        (Exclusive | Modified, SnoopedBusRd) => Transition::flush_then(Next::Go(Owned)),
        (Owned, SnoopedBusRd) => Transition::flush_then(Next::Keep),
        (Shared, SnoopedBusRd) => Transition::NOOP,

        // snooped read-exclusive
        (Exclusive | Owned | Modified, SnoopedBusRdX) => Transition::flush_then(Next::Go(Invalid)),
        (Shared, SnoopedBusRdX) => Transition::go(Invalid, B::None, D::None),

        // snooped upgrades; the upgrader already holds the data
        (Shared | Owned, SnoopedBusUpgr) => Transition::go(Invalid, B::None, D::None),
        (Exclusive | Modified, SnoopedBusUpgr) => Transition::NOOP,
    }
}
