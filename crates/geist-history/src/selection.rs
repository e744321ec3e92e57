use std::cell::RefCell;
use std::rc::Rc;

use geist_edit::DimensionId;
use geist_geom::{BlockBox, IVec3};

/// How a [`Selection`]'s points are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionMode {
    /// Two corners of a cuboid.
    #[default]
    Cuboid,
    /// Every listed block, in any shape.
    Volume,
}

/// Player selection: a two-corner cuboid or an arbitrary block volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub dim: DimensionId,
    pub mode: SelectionMode,
    corners: [Option<IVec3>; 2],
    volume: Vec<IVec3>,
}

/// Selection shared between a session and its history.
pub type SharedSelection = Rc<RefCell<Selection>>;

impl Selection {
    pub fn new(dim: DimensionId) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    pub fn cuboid(dim: DimensionId, a: IVec3, b: IVec3) -> Self {
        Self {
            dim,
            mode: SelectionMode::Cuboid,
            corners: [Some(a), Some(b)],
            volume: Vec::new(),
        }
    }

    /// Volume selection over `points`; duplicates keep their first position.
    pub fn volume(dim: DimensionId, points: impl IntoIterator<Item = IVec3>) -> Self {
        let mut sel = Self {
            dim,
            mode: SelectionMode::Volume,
            ..Self::default()
        };
        for p in points {
            sel.add_point(p);
        }
        sel
    }

    pub fn shared(self) -> SharedSelection {
        Rc::new(RefCell::new(self))
    }

    pub fn first(&self) -> Option<IVec3> {
        self.corners[0]
    }

    pub fn second(&self) -> Option<IVec3> {
        self.corners[1]
    }

    /// Set the first corner. A volume selection turns back into a cuboid.
    pub fn set_first(&mut self, p: IVec3) {
        self.to_cuboid();
        self.corners[0] = Some(p);
    }

    pub fn set_second(&mut self, p: IVec3) {
        self.to_cuboid();
        self.corners[1] = Some(p);
    }

    /// Add one block. A cuboid selection turns into an empty volume first.
    pub fn add_point(&mut self, p: IVec3) {
        if self.mode == SelectionMode::Cuboid {
            self.corners = [None, None];
            self.mode = SelectionMode::Volume;
        }
        if !self.volume.contains(&p) {
            self.volume.push(p);
        }
    }

    fn to_cuboid(&mut self) {
        if self.mode == SelectionMode::Volume {
            self.volume.clear();
            self.mode = SelectionMode::Cuboid;
        }
    }

    /// The set corners of a cuboid, or every block of a volume.
    pub fn points(&self) -> Vec<IVec3> {
        match self.mode {
            SelectionMode::Cuboid => self.corners.iter().flatten().copied().collect(),
            SelectionMode::Volume => self.volume.clone(),
        }
    }

    /// Blocks of a volume selection; `None` for cuboids.
    pub fn blocks(&self) -> Option<&[IVec3]> {
        match self.mode {
            SelectionMode::Cuboid => None,
            SelectionMode::Volume => Some(&self.volume),
        }
    }

    pub fn clear(&mut self) {
        self.corners = [None, None];
        self.volume.clear();
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        match self.mode {
            SelectionMode::Cuboid => self.corners.iter().all(Option::is_some),
            SelectionMode::Volume => !self.volume.is_empty(),
        }
    }

    /// Componentwise min/max bounding box of the selected points.
    pub fn region(&self) -> Option<BlockBox> {
        match self.mode {
            SelectionMode::Cuboid => Some(BlockBox::from_corners(self.corners[0]?, self.corners[1]?)),
            SelectionMode::Volume => {
                let (first, rest) = self.volume.split_first()?;
                Some(
                    rest.iter()
                        .fold(BlockBox::single(*first), |b, p| b.union(&BlockBox::single(*p))),
                )
            }
        }
    }
}
