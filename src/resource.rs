use crate::connection::{post_json, put_json};
use crate::{CanvasCredentials, Course};
use log::debug;
use serde_json::{Map, Value};
use std::error::Error;
use std::sync::Arc;

/// Parent link of a [`Resource`]: the owning course, or another resource for
/// deeper nestings such as course -> quiz -> question.
#[derive(Clone)]
pub enum ResourceParent {
    Course(Course),
    Resource(Box<Resource>),
}

/// A nested Canvas resource addressed below a course.
///
/// One type covers every resource kind (quiz, question, question group,
/// assignment, page): each instance knows its URL route segment, the field
/// that identifies it, and the key its writable fields are wrapped under in
/// request bodies. The identifier is `None` until the resource has been
/// created on Canvas; every successful create or update overwrites it with
/// the server-assigned value.
///
/// Credentials are copied from the course at the root of the parent chain
/// when the resource is built, so a child and its parent always carry the
/// same token.
#[derive(Clone)]
pub struct Resource {
    parent: ResourceParent,
    route_name: String,
    id_field: String,
    request_param_name: String,
    data: Map<String, Value>,
    id: Option<Value>,
    credentials: Arc<CanvasCredentials>,
}

/// Builder for [`Resource`].
///
/// Only the parent, route and initial data are mandatory; the identifier
/// field defaults to `"id"` and the request wrap key defaults to the
/// singular form of the route segment (`"quizzes"` -> `"quiz"`).
pub struct ResourceBuilder {
    parent: ResourceParent,
    route_name: String,
    data: Map<String, Value>,
    id_field: String,
    request_param_name: Option<String>,
}

// "quizzes" -> "quiz", "questions" -> "question", "pages" -> "page"
fn singular(route: &str) -> String {
    if let Some(stem) = route.strip_suffix("zes") {
        stem.to_string()
    } else if let Some(stem) = route.strip_suffix('s') {
        stem.to_string()
    } else {
        route.to_string()
    }
}

fn into_object(data: Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ResourceBuilder {
    pub fn new(parent: ResourceParent, route_name: &str, data: Value) -> ResourceBuilder {
        ResourceBuilder {
            parent,
            route_name: route_name.to_string(),
            data: into_object(data),
            id_field: "id".to_string(),
            request_param_name: None,
        }
    }

    /// Overrides the identifier field (pages identify by `"url"`).
    pub fn id_field(mut self, field: &str) -> ResourceBuilder {
        self.id_field = field.to_string();
        self
    }

    /// Overrides the request-body wrap key (pages wrap as `"wiki_page"`).
    pub fn wrap_key(mut self, key: &str) -> ResourceBuilder {
        self.request_param_name = Some(key.to_string());
        self
    }

    pub fn build(self) -> Resource {
        let credentials = match &self.parent {
            ResourceParent::Course(course) => Arc::clone(&course.info.canvas_info),
            ResourceParent::Resource(parent) => Arc::clone(&parent.credentials),
        };
        let id = self
            .data
            .get(&self.id_field)
            .filter(|value| !value.is_null())
            .cloned();
        let request_param_name = self
            .request_param_name
            .unwrap_or_else(|| singular(&self.route_name));
        Resource {
            parent: self.parent,
            route_name: self.route_name,
            id_field: self.id_field,
            request_param_name,
            data: self.data,
            id,
            credentials,
        }
    }
}

/// Whether pushing a resource creates it or updates it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Create,
    Update,
}

/// The request a call to [`Resource::update`] will issue: update PUTs to the
/// instance URL wrapped under the singular param name, create POSTs to the
/// collection URL wrapped under the route name. The backend expects this
/// envelope asymmetry.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub mutation: Mutation,
    pub url: String,
    pub wrap_key: String,
}

impl Resource {
    /// Walks the parent chain to the owning course.
    pub fn course(&self) -> &Course {
        match &self.parent {
            ResourceParent::Course(course) => course,
            ResourceParent::Resource(parent) => parent.course(),
        }
    }

    pub fn credentials(&self) -> &Arc<CanvasCredentials> {
        &self.credentials
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// The identifier rendered as a URL path segment; numeric for most
    /// resources, textual for url-identified ones.
    pub fn id_segment(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Reads one field of the locally held data. No network call.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Writes one field of the locally held data. No network call; the edit
    /// reaches Canvas on the next [`Resource::update`].
    pub fn set(&mut self, field: &str, value: Value) {
        self.data.insert(field.to_string(), value);
    }

    fn parent_url(&self) -> String {
        match &self.parent {
            ResourceParent::Course(course) => course.url_prefix(),
            // A parent that was never created contributes its collection URL;
            // supported flows always create parents before children.
            ResourceParent::Resource(parent) => {
                parent.url().unwrap_or_else(|| parent.base_url())
            }
        }
    }

    /// URL of the collection this resource belongs to.
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.parent_url(), self.route_name)
    }

    /// URL of this particular resource, once it has an identifier.
    pub fn url(&self) -> Option<String> {
        Some(format!("{}/{}", self.base_url(), self.id_segment()?))
    }

    /// Plans the next push without issuing it.
    pub fn update_plan(&self) -> UpdatePlan {
        match self.url() {
            Some(url) => UpdatePlan {
                mutation: Mutation::Update,
                url,
                wrap_key: self.request_param_name.clone(),
            },
            None => UpdatePlan {
                mutation: Mutation::Create,
                url: self.base_url(),
                wrap_key: self.route_name.clone(),
            },
        }
    }

    /// Adopts a server response as the new local state, recomputing the
    /// identifier from the configured id field.
    fn adopt(&mut self, data: Map<String, Value>) {
        self.data = data;
        self.id = self
            .data
            .get(&self.id_field)
            .filter(|value| !value.is_null())
            .cloned();
    }

    /// Pushes the held data to Canvas, creating the resource when it has no
    /// identifier yet and updating it otherwise.
    ///
    /// When `new_data` is given it replaces the held data wholesale before
    /// the push. On success the identifier and URL are recomputed from the
    /// response; on failure the entity keeps the state it had before the
    /// call issued (no partial identifier assignment). Returns `self` for
    /// chaining.
    pub fn update(&mut self, new_data: Option<Value>) -> Result<&mut Resource, Box<dyn Error>> {
        if let Some(data) = new_data {
            self.data = into_object(data);
        }
        let plan = self.update_plan();
        debug!(
            "{} {} ({})",
            match plan.mutation {
                Mutation::Create => "creating",
                Mutation::Update => "updating",
            },
            plan.url,
            self.route_name
        );
        let mut envelope = Map::new();
        envelope.insert(plan.wrap_key.clone(), Value::Object(self.data.clone()));
        let path = plan.url;
        let response = match plan.mutation {
            Mutation::Update => put_json(&self.credentials, &path, Value::Object(envelope))?,
            Mutation::Create => post_json(&self.credentials, &path, Value::Object(envelope))?,
        };
        if let Some(Value::Object(data)) = response {
            self.adopt(data);
        }
        Ok(self)
    }
}
