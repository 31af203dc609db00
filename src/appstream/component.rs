//! Mutable component trees used before silo compilation.
//!
//! Adapters (desktop entries, plugin-synthesized components) build a
//! [`ComponentBuilder`], optionally run the mutators below, then hand it to
//! the silo builder. After compilation nothing here is reachable any more.

/// One element of a synthetic component tree.
#[derive(Clone, Debug, Default)]
pub struct ComponentBuilder {
    element: String,
    text: Option<String>,
    attrs: Vec<(String, String)>,
    children: Vec<ComponentBuilder>,
}

impl ComponentBuilder {
    /// Create an element node.
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            ..Self::default()
        }
    }

    /// Element name.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Leading text content.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Set the text content.
    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(text.into());
        self
    }

    /// Attribute list in insertion order.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
        self
    }

    /// Child nodes.
    pub fn children(&self) -> &[ComponentBuilder] {
        &self.children
    }

    /// Append a child node and return a handle to it.
    pub fn insert(&mut self, element: impl Into<String>) -> &mut ComponentBuilder {
        self.children.push(ComponentBuilder::new(element));
        self.children.last_mut().expect("just pushed")
    }

    /// Append a child with text in one go.
    pub fn insert_text(&mut self, element: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.insert(element).set_text(text);
        self
    }

    /// First child with the given element, optionally requiring its text.
    pub fn child_mut(&mut self, element: &str, text: Option<&str>) -> Option<&mut ComponentBuilder> {
        self.children
            .iter_mut()
            .find(|c| c.element == element && text.is_none_or(|t| c.text.as_deref() == Some(t)))
    }

    /// Index of the first matching child; split from `child_mut` to avoid
    /// holding a borrow while inserting.
    fn child_index(&self, element: &str, text: Option<&str>) -> Option<usize> {
        self.children
            .iter()
            .position(|c| c.element == element && text.is_none_or(|t| c.text.as_deref() == Some(t)))
    }

    /// Ensure a `<keywords><keyword>str</keyword></keywords>` entry exists.
    pub fn add_keyword(&mut self, keyword: &str) {
        let idx = match self.child_index("keywords", None) {
            Some(i) => i,
            None => {
                self.insert("keywords");
                self.children.len() - 1
            }
        };
        let keywords = &mut self.children[idx];
        if keywords.child_index("keyword", Some(keyword)).is_none() {
            keywords.insert_text("keyword", keyword);
        }
    }

    /// Ensure a `<provides><id>str</id></provides>` entry exists.
    pub fn add_provide(&mut self, id: &str) {
        let idx = match self.child_index("provides", None) {
            Some(i) => i,
            None => {
                self.insert("provides");
                self.children.len() - 1
            }
        };
        let provides = &mut self.children[idx];
        if provides.child_index("id", Some(id)).is_none() {
            provides.insert_text("id", id);
        }
    }

    /// Ensure a `<categories><category>str</category></categories>` entry
    /// exists.
    pub fn add_category(&mut self, category: &str) {
        let idx = match self.child_index("categories", None) {
            Some(i) => i,
            None => {
                self.insert("categories");
                self.children.len() - 1
            }
        };
        let categories = &mut self.children[idx];
        if categories.child_index("category", Some(category)).is_none() {
            categories.insert_text("category", category);
        }
    }

    /// Add a stock `<icon>` unless any icon is already present.
    pub fn add_icon(&mut self, name: &str) {
        if self.child_index("icon", None).is_none() {
            self.insert("icon")
                .set_attr("type", "stock")
                .set_text(name);
        }
    }

    /// Derive implicit categories, keywords and icons from the component
    /// kind so sparse metadata still lands in sensible shelves.
    pub fn add_extra_info(&mut self) {
        let kind = self.attr("type").unwrap_or_default().to_owned();
        match kind.as_str() {
            "web-application" => {
                self.add_keyword(&kind);
            }
            "font" => {
                self.add_category("Addon");
                self.add_category("Font");
            }
            "driver" => {
                self.add_category("Addon");
                self.add_category("Driver");
                self.add_icon("system-component-driver");
            }
            "localization" => {
                self.add_category("Addon");
                self.add_category("Localization");
                self.add_icon("system-component-language");
            }
            "codec" => {
                self.add_category("Addon");
                self.add_category("Codec");
                self.add_icon("system-component-codecs");
            }
            "inputmethod" => {
                self.add_keyword(&kind);
                self.add_category("Addon");
                self.add_category("InputSource");
                self.add_icon("system-component-input-sources");
            }
            "firmware" => {
                self.add_icon("system-component-firmware");
            }
            _ => {}
        }
    }

    /// Resolve a relative media URI in this node's text against `baseurl`.
    pub fn fix_url(&mut self, baseurl: &str) {
        let Some(text) = self.text.as_deref() else {
            return;
        };
        if text.starts_with("http:") || text.starts_with("https:") {
            return;
        }
        self.text = Some(format!("{baseurl}/{text}"));
    }
}
