use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a model class in the host application, e.g. `auth.user`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentType {
    pub app_label: String,
    /// Lower-cased model name
    pub model: String,
}

impl ContentType {
    pub fn new(app_label: &str, model: &str) -> Self {
        Self {
            app_label: app_label.to_string(),
            model: model.to_lowercase(),
        }
    }

    /// Parse a `"app_label.model"` label. Returns None without a `.` or with an empty side.
    pub fn parse(label: &str) -> Option<Self> {
        let (app_label, model) = label.split_once('.')?;
        if app_label.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(app_label, model))
    }

    /// The `"app_label.model"` form stored alongside every grant.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

/// A reference to one object instance of some content type.
///
/// `object_id` is None for an instance that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub content_type: ContentType,
    pub object_id: Option<String>,
}

impl ObjectRef {
    pub fn new(content_type: ContentType, object_id: impl Into<String>) -> Self {
        Self {
            content_type,
            object_id: Some(object_id.into()),
        }
    }

    pub fn unsaved(content_type: ContentType) -> Self {
        Self {
            content_type,
            object_id: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.object_id.is_some()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object_id {
            Some(id) => write!(f, "{}:{}", self.content_type, id),
            None => write!(f, "{}:<unsaved>", self.content_type),
        }
    }
}

/// What a permission is checked against or assigned on: a whole model class
/// or a single instance of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Model(ContentType),
    Instance(ObjectRef),
}

impl Target {
    pub fn model(app_label: &str, model: &str) -> Self {
        Target::Model(ContentType::new(app_label, model))
    }

    pub fn instance(app_label: &str, model: &str, object_id: impl Into<String>) -> Self {
        Target::Instance(ObjectRef::new(ContentType::new(app_label, model), object_id))
    }

    /// Parse `"app.model"` (class) or `"app.model:id"` (instance).
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once(':') {
            Some((label, id)) if !id.is_empty() => {
                Some(Target::Instance(ObjectRef::new(ContentType::parse(label)?, id)))
            }
            Some(_) => None,
            None => ContentType::parse(s).map(Target::Model),
        }
    }

    pub fn content_type(&self) -> &ContentType {
        match self {
            Target::Model(ct) => ct,
            Target::Instance(obj) => &obj.content_type,
        }
    }

    pub fn as_instance(&self) -> Option<&ObjectRef> {
        match self {
            Target::Model(_) => None,
            Target::Instance(obj) => Some(obj),
        }
    }

    /// True for instances (saved or not) of the given model.
    pub fn is_instance_of(&self, content_type: &ContentType) -> bool {
        matches!(self, Target::Instance(obj) if &obj.content_type == content_type)
    }
}

impl From<ContentType> for Target {
    fn from(content_type: ContentType) -> Self {
        Target::Model(content_type)
    }
}

impl From<ObjectRef> for Target {
    fn from(obj: ObjectRef) -> Self {
        Target::Instance(obj)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Model(ct) => write!(f, "{}", ct),
            Target::Instance(obj) => write!(f, "{}", obj),
        }
    }
}
