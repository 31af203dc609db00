//! Value types carried by an [`crate::app::App`].

use std::sync::atomic::{AtomicUsize, Ordering};

/// Component kind, mirroring the AppStream component `type` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AppKind {
    /// Nothing known yet.
    #[default]
    Unknown,
    /// Graphical desktop application.
    DesktopApp,
    /// Web application launched through a browser shell.
    WebApp,
    /// Font package.
    Font,
    /// Media codec.
    Codec,
    /// Hardware driver.
    Driver,
    /// Device firmware.
    Firmware,
    /// Input method engine.
    InputMethod,
    /// Language pack.
    Localization,
    /// Addon extending another component.
    Addon,
    /// Generic component.
    Generic,
    /// Package repository.
    Repository,
    /// Operating system upgrade.
    OperatingSystem,
    /// Shared runtime.
    Runtime,
    /// Terminal application.
    ConsoleApp,
}

impl AppKind {
    /// Parse the AppStream `type` attribute value.
    pub fn from_str(s: &str) -> Self {
        match s {
            "desktop" | "desktop-application" => AppKind::DesktopApp,
            "web-application" => AppKind::WebApp,
            "font" => AppKind::Font,
            "codec" => AppKind::Codec,
            "driver" => AppKind::Driver,
            "firmware" => AppKind::Firmware,
            "inputmethod" | "input-method" => AppKind::InputMethod,
            "localization" => AppKind::Localization,
            "addon" => AppKind::Addon,
            "generic" => AppKind::Generic,
            "repository" => AppKind::Repository,
            "operating-system" => AppKind::OperatingSystem,
            "runtime" => AppKind::Runtime,
            "console-application" => AppKind::ConsoleApp,
            _ => AppKind::Unknown,
        }
    }

    /// Serialize back to the AppStream spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            AppKind::Unknown => "unknown",
            AppKind::DesktopApp => "desktop-application",
            AppKind::WebApp => "web-application",
            AppKind::Font => "font",
            AppKind::Codec => "codec",
            AppKind::Driver => "driver",
            AppKind::Firmware => "firmware",
            AppKind::InputMethod => "inputmethod",
            AppKind::Localization => "localization",
            AppKind::Addon => "addon",
            AppKind::Generic => "generic",
            AppKind::Repository => "repository",
            AppKind::OperatingSystem => "operating-system",
            AppKind::Runtime => "runtime",
            AppKind::ConsoleApp => "console-application",
        }
    }

    /// Kinds that can never be launched directly.
    pub fn never_launchable(self) -> bool {
        matches!(
            self,
            AppKind::Repository
                | AppKind::Addon
                | AppKind::Codec
                | AppKind::Driver
                | AppKind::Firmware
                | AppKind::Font
                | AppKind::Generic
                | AppKind::InputMethod
                | AppKind::Localization
                | AppKind::OperatingSystem
                | AppKind::Runtime
        )
    }
}

/// Auxiliary tag for apps that stand in for something else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpecialKind {
    /// Plain app.
    #[default]
    None,
    /// Synthetic shell representing the OS update set.
    OsUpdate,
}

/// Where a component is installed or installable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Not yet known.
    #[default]
    Unknown,
    /// System-wide.
    System,
    /// Per-user.
    User,
}

impl Scope {
    /// Parse the AppStream scope spelling.
    pub fn from_str(s: &str) -> Self {
        match s {
            "system" => Scope::System,
            "user" => Scope::User,
            _ => Scope::Unknown,
        }
    }

    /// Serialize back to the AppStream spelling, `*` when unknown.
    pub fn as_unique_segment(self) -> &'static str {
        match self {
            Scope::Unknown => "*",
            Scope::System => "system",
            Scope::User => "user",
        }
    }
}

/// Packaging technology delivering a component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// Not yet known.
    #[default]
    Unknown,
    /// Distribution package.
    Package,
    /// Flatpak bundle.
    Flatpak,
    /// Snap bundle.
    Snap,
}

impl BundleKind {
    /// Parse the AppStream `bundle type` attribute value.
    pub fn from_str(s: &str) -> Self {
        match s {
            "package" => BundleKind::Package,
            "flatpak" => BundleKind::Flatpak,
            "snap" => BundleKind::Snap,
            _ => BundleKind::Unknown,
        }
    }

    /// Serialize back to the AppStream spelling, `*` when unknown.
    pub fn as_unique_segment(self) -> &'static str {
        match self {
            BundleKind::Unknown => "*",
            BundleKind::Package => "package",
            BundleKind::Flatpak => "flatpak",
            BundleKind::Snap => "snap",
        }
    }
}

/// Where an icon's pixels come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IconKind {
    /// Named icon from the platform icon set.
    Stock,
    /// Absolute path on disk.
    Local,
    /// Remote URL, fetched by the UI layer.
    Remote,
    /// Distro-cached icon resolved against the icon prefix.
    Cached,
    /// Named icon resolved through the user's theme.
    Themed,
    /// Raw bytes embedded as a last resort.
    Fallback,
}

impl IconKind {
    /// Parse the AppStream `icon type` attribute; `None` for unknown kinds.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stock" => Some(IconKind::Stock),
            "local" => Some(IconKind::Local),
            "remote" => Some(IconKind::Remote),
            "cached" => Some(IconKind::Cached),
            _ => None,
        }
    }
}

/// Icon descriptor. Construction never touches the filesystem or the
/// network; existence checks are deferred to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Icon {
    /// Pixel source kind.
    pub kind: IconKind,
    /// Name, path or URL depending on `kind`.
    pub source: String,
    /// Nominal width in pixels, 0 when unspecified.
    pub width: u32,
    /// Nominal height in pixels, 0 when unspecified.
    pub height: u32,
    /// Display scale factor the icon targets.
    pub scale: u32,
    /// Directory prefix for `Stock`/`Cached` icons shipped alongside the
    /// metadata, composed from the catalog origin.
    pub prefix: Option<String>,
}

impl Icon {
    /// Construct an icon of the given kind and source.
    pub fn new(kind: IconKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            width: 0,
            height: 0,
            scale: 1,
            prefix: None,
        }
    }
}

/// One image inside a screenshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotImage {
    /// Width in pixels, 0 when unspecified.
    pub width: u32,
    /// Height in pixels, 0 when unspecified.
    pub height: u32,
    /// `source` or `thumbnail`.
    pub kind: String,
    /// Image URL.
    pub url: String,
}

/// One video inside a screenshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotVideo {
    /// Width in pixels, 0 when unspecified.
    pub width: u32,
    /// Height in pixels, 0 when unspecified.
    pub height: u32,
    /// Video codec name.
    pub codec: String,
    /// Container format name.
    pub container: String,
    /// Video URL.
    pub url: String,
}

/// Screenshot with caption, images and videos.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Screenshot {
    /// Optional caption text.
    pub caption: Option<String>,
    /// Images, largest first as shipped.
    pub images: Vec<ScreenshotImage>,
    /// Videos as shipped.
    pub videos: Vec<ScreenshotVideo>,
}

/// Severity of a pending update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum UrgencyKind {
    /// Not stated.
    #[default]
    Unknown,
    /// Nice to have.
    Low,
    /// Normal maintenance release.
    Medium,
    /// Important fix.
    High,
    /// Security critical.
    Critical,
}

impl UrgencyKind {
    /// Parse the AppStream `urgency` attribute value.
    pub fn from_str(s: &str) -> Self {
        match s {
            "low" => UrgencyKind::Low,
            "medium" => UrgencyKind::Medium,
            "high" => UrgencyKind::High,
            "critical" => UrgencyKind::Critical,
            _ => UrgencyKind::Unknown,
        }
    }
}

/// One entry of an app's release history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Release {
    /// Version string.
    pub version: String,
    /// Release time in unix seconds when known.
    pub timestamp: Option<u64>,
    /// Formatted description markup.
    pub description: Option<String>,
    /// Stated urgency.
    pub urgency: UrgencyKind,
}

/// Relation category between a component and an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Hard requirement.
    Requires,
    /// Soft recommendation.
    Recommends,
    /// Declared as supported.
    Supports,
}

/// The item side of a relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationItem {
    /// Another component id.
    Id(String),
    /// An input control kind (`pointing`, `keyboard`, `touchscreen`, ...).
    Control(String),
    /// Display length constraint in pixels.
    DisplayLength {
        /// Comparison operator (`ge`, `le`, ...).
        compare: String,
        /// Which display side the constraint applies to.
        side: String,
        /// Length in logical pixels.
        px: u32,
    },
}

/// A single relation entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Relation category.
    pub kind: RelationKind,
    /// Related item.
    pub item: RelationItem,
}

/// Kind of a `<provides>` child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProvidedKind {
    /// Executable name.
    Binary,
    /// Shared library soname.
    Library,
    /// Runtime-loaded firmware blob.
    FirmwareRuntime,
    /// Device-flashed firmware blob.
    FirmwareFlashed,
    /// System bus name.
    DbusSystem,
    /// Session bus name.
    DbusUser,
    /// Handled media type.
    MediaType,
    /// Python module.
    Python,
    /// Alternate component id.
    Id,
}

impl ProvidedKind {
    /// Parse a simple `<provides>` child element name; complex cases
    /// (`firmware`, `dbus`) are resolved by the caller from attributes.
    pub fn from_simple_element(name: &str) -> Option<Self> {
        match name {
            "binary" => Some(ProvidedKind::Binary),
            "library" => Some(ProvidedKind::Library),
            "mediatype" | "mimetype" => Some(ProvidedKind::MediaType),
            "python3" | "python" => Some(ProvidedKind::Python),
            "id" => Some(ProvidedKind::Id),
            _ => None,
        }
    }
}

/// One provided item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvidedItem {
    /// Item kind.
    pub kind: ProvidedKind,
    /// Item value.
    pub value: String,
}

/// Tri-state byte count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SizeValue {
    /// Not resolved yet.
    #[default]
    Unknown,
    /// Resolved byte count.
    Known(u64),
    /// Can never be resolved for this app.
    Unknowable,
}

/// Which size slot to read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeKind {
    /// Bytes on disk once installed.
    Installed,
    /// Bytes to download.
    Download,
    /// App-managed data.
    Data,
    /// App-managed cache.
    Cache,
    /// Per-user data.
    UserData,
}

/// All size slots of an app.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppSizes {
    /// Bytes on disk once installed.
    pub installed: SizeValue,
    /// Bytes to download.
    pub download: SizeValue,
    /// App-managed data.
    pub data: SizeValue,
    /// App-managed cache.
    pub cache: SizeValue,
    /// Per-user data.
    pub user_data: SizeValue,
}

/// OARS content rating attribute value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RatingValue {
    /// Not stated.
    #[default]
    Unknown,
    /// Content absent.
    None,
    /// Mild presence.
    Mild,
    /// Moderate presence.
    Moderate,
    /// Intense presence.
    Intense,
}

impl RatingValue {
    /// Parse the OARS value spelling.
    pub fn from_str(s: &str) -> Self {
        match s {
            "none" => RatingValue::None,
            "mild" => RatingValue::Mild,
            "moderate" => RatingValue::Moderate,
            "intense" => RatingValue::Intense,
            _ => RatingValue::Unknown,
        }
    }
}

/// OARS content rating tag set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentRating {
    /// Rating system kind, e.g. `oars-1.1`.
    pub kind: String,
    /// Attribute id to value, e.g. `violence-cartoon` to `mild`.
    pub attributes: Vec<(String, RatingValue)>,
}

/// How a component can be launched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaunchableKind {
    /// Desktop file id.
    DesktopId,
    /// Launch URL.
    Url,
}

/// Job kind currently queued against an app, shown as a badge by the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingAction {
    /// Queued install.
    Install,
    /// Queued removal.
    Remove,
    /// Queued update.
    Update,
}

/// Catalog category with desktop-group mappings and an app counter.
///
/// The counter is filled by `refine_category_sizes`; parents aggregate
/// their children.
#[derive(Debug, Default)]
pub struct Category {
    /// Stable category id, e.g. `create`.
    pub id: String,
    /// Desktop groups backing the category, `Main` or `Main::Sub` pairs.
    pub desktop_groups: Vec<String>,
    /// Child categories.
    pub children: Vec<Category>,
    size: AtomicUsize,
}

impl Category {
    /// Create a category with the given id and groups.
    pub fn new(id: impl Into<String>, desktop_groups: Vec<String>) -> Self {
        Self {
            id: id.into(),
            desktop_groups,
            children: Vec::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Number of apps counted into this category so far.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Add to the app counter.
    pub fn increment_size(&self, by: usize) {
        self.size.fetch_add(by, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_kind_round_trips() {
        assert_eq!(AppKind::from_str("desktop-application"), AppKind::DesktopApp);
        assert_eq!(AppKind::from_str("desktop"), AppKind::DesktopApp);
        assert_eq!(AppKind::from_str(AppKind::Repository.as_str()), AppKind::Repository);
    }

    #[test]
    fn launchable_kinds_are_limited() {
        assert!(AppKind::Font.never_launchable());
        assert!(!AppKind::DesktopApp.never_launchable());
        assert!(!AppKind::WebApp.never_launchable());
    }

    #[test]
    fn urgency_is_ordered() {
        assert!(UrgencyKind::Critical > UrgencyKind::Low);
    }

    #[test]
    fn category_counts_aggregate() {
        let cat = Category::new("create", vec!["Graphics".into()]);
        cat.increment_size(3);
        cat.increment_size(2);
        assert_eq!(cat.size(), 5);
    }
}
