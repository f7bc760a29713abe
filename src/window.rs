use std::{fmt, num::NonZeroU32, sync::Arc};

use bitflags::bitflags;

use crate::subscription::SubscriptionHandle;

/// Registry-assigned handle. Zero is never a valid handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(NonZeroU32);

impl WindowHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier from the older windowing protocol. The wire value 0 means
/// "not resolved yet" and has no `LegacyId` representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyId(NonZeroU32);

impl LegacyId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Object-path style reference used by the compositor-facing source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(Arc<str>);

impl ObjectRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectRef {
    fn from(path: &str) -> Self {
        Self(Arc::from(path))
    }
}

impl From<String> for ObjectRef {
    fn from(path: String) -> Self {
        Self(Arc::from(path))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowField {
    Title,
    Icon,
    Attention,
    Geometry,
    Active,
}

impl WindowField {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowField::Title => "title",
            WindowField::Icon => "icon",
            WindowField::Attention => "attention",
            WindowField::Geometry => "geometry",
            WindowField::Active => "active",
        }
    }
}

impl fmt::Display for WindowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Fields changed since the last [`WindowRecord::take_dirty`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct WindowFields: u8 {
        const TITLE = 1 << 0;
        const ICON = 1 << 1;
        const ATTENTION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const ACTIVE = 1 << 4;
    }
}

impl From<WindowField> for WindowFields {
    fn from(field: WindowField) -> Self {
        match field {
            WindowField::Title => WindowFields::TITLE,
            WindowField::Icon => WindowFields::ICON,
            WindowField::Attention => WindowFields::ATTENTION,
            WindowField::Geometry => WindowFields::GEOMETRY,
            WindowField::Active => WindowFields::ACTIVE,
        }
    }
}

/// A single property update as delivered by a per-window subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Title(String),
    Icon(String),
    Attention(bool),
    Geometry(Rect),
}

impl PropertyValue {
    pub fn field(&self) -> WindowField {
        match self {
            PropertyValue::Title(_) => WindowField::Title,
            PropertyValue::Icon(_) => WindowField::Icon,
            PropertyValue::Attention(_) => WindowField::Attention,
            PropertyValue::Geometry(_) => WindowField::Geometry,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Changed(WindowField),
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        matches!(self, Change::Changed(_))
    }
}

#[derive(Clone, Debug)]
pub struct WindowRecord {
    object: ObjectRef,
    handle: WindowHandle,
    legacy: Option<LegacyId>,
    title: String,
    icon: String,
    attention: bool,
    geometry: Rect,
    active: bool,
    version: u64,
    dirty: WindowFields,
    pub(crate) subscription: Option<SubscriptionHandle>,
}

impl WindowRecord {
    pub fn new(object: ObjectRef, handle: WindowHandle) -> Self {
        Self {
            object,
            handle,
            legacy: None,
            title: String::new(),
            icon: String::new(),
            attention: false,
            geometry: Rect::default(),
            active: false,
            version: 1,
            dirty: WindowFields::empty(),
            subscription: None,
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn legacy(&self) -> Option<LegacyId> {
        self.legacy
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn attention(&self) -> bool {
        self.attention
    }

    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dirty(&self) -> WindowFields {
        self.dirty
    }

    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    /// Applies a property update. Values equal to the cached one are
    /// `Unchanged` and leave version and dirty set untouched.
    pub fn apply(&mut self, value: PropertyValue) -> Change {
        let field = value.field();
        let changed = match value {
            PropertyValue::Title(title) => replace_if_different(&mut self.title, title),
            PropertyValue::Icon(icon) => replace_if_different(&mut self.icon, icon),
            PropertyValue::Attention(attention) => {
                replace_if_different(&mut self.attention, attention)
            }
            PropertyValue::Geometry(geometry) => replace_if_different(&mut self.geometry, geometry),
        };

        if changed {
            self.mark(field);
            Change::Changed(field)
        } else {
            Change::Unchanged
        }
    }

    pub fn set_active(&mut self, active: bool) -> Change {
        if replace_if_different(&mut self.active, active) {
            self.mark(WindowField::Active);
            Change::Changed(WindowField::Active)
        } else {
            Change::Unchanged
        }
    }

    pub fn take_dirty(&mut self) -> WindowFields {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn set_legacy(&mut self, legacy: LegacyId) {
        self.legacy = Some(legacy);
    }

    fn mark(&mut self, field: WindowField) {
        self.version += 1;
        self.dirty |= field.into();
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
