#![forbid(unsafe_code)]

//! Turns wire directives into typed [`Directive`]s.
//!
//! Normalization never fails for a single bad directive: problems are
//! collected as [`DirectiveIssue`]s on the [`Normalized`] result and the
//! directive is reported invalid. Only an empty batch is a call-level error.

mod fields;

use crate::attributes::{AttrValue, AttributePatch};
use crate::directive::*;
use crate::ids::{ChangesetIdError, EntityId, EntityRef, ObjectKind, TempRef};
use crate::resolver::{IdResolver, ResolveError};
use fields::*;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("needs a changeset: no directives to apply")]
    EmptyBatch,
    #[error("shape query needs exactly one of ids, changeset, period or year")]
    MissingSelector,
    #[error("invalid changeset id: {0}")]
    InvalidChangesetId(#[from] ChangesetIdError),
}

pub fn ensure_batch(directives: Option<&[DirectiveSpec]>) -> Result<&[DirectiveSpec], InputError> {
    match directives {
        Some(list) if !list.is_empty() => Ok(list),
        _ => Err(InputError::EmptyBatch),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveIssue {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
    #[error("{field}: temporary id `{reference}` was not created earlier in this batch")]
    Unresolved { field: String, reference: TempRef },
}

impl DirectiveIssue {
    pub fn is_reference(&self) -> bool {
        matches!(self, DirectiveIssue::Unresolved { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    pub index: usize,
    /// `None` exactly when `issues` is non-empty.
    pub directive: Option<Directive>,
    pub issues: Vec<DirectiveIssue>,
    pub record: DirectiveRecord,
}

impl Normalized {
    pub fn is_invalid(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    pub fn action(&self) -> Option<Action> {
        self.record.directive.action_text().and_then(Action::parse)
    }

    pub fn object(&self) -> Option<ObjectKind> {
        self.record.directive.object_text().and_then(ObjectKind::parse)
    }
}

pub struct Normalizer<'r> {
    resolver: &'r IdResolver,
}

impl<'r> Normalizer<'r> {
    pub fn new(resolver: &'r IdResolver) -> Self {
        Self { resolver }
    }

    pub fn normalize(&self, index: usize, spec: &DirectiveSpec) -> Normalized {
        let mut cx = Shaper {
            resolver: self.resolver,
            issues: Vec::new(),
            record: DirectiveRecord::from_spec(spec),
            data: Map::new(),
            spec,
        };

        let action = cx.enum_field("action", spec.action.as_ref(), Action::parse, "add, edit or delete");
        let object = cx.enum_field(
            "object",
            spec.object.as_ref(),
            ObjectKind::parse,
            "node, way, shape, layer, type, period or source",
        );
        let (Some(action), Some(object)) = (action, object) else {
            return cx.finish(index, None);
        };
        cx.load_data();
        let user_id = cx.user_id();

        let target = cx.target(action, object);
        let scope = cx.scope();
        let payload = match action {
            Action::Delete => cx.delete_payload(object),
            Action::Add | Action::Edit => cx.payload(action, object),
        };

        let directive = target.map(|target| Directive {
            index,
            action,
            object,
            target,
            payload,
            scope,
            user_id,
        });
        cx.finish(index, directive)
    }
}

struct Shaper<'r, 's> {
    resolver: &'r IdResolver,
    issues: Vec<DirectiveIssue>,
    record: DirectiveRecord,
    /// Data fields not yet consumed by the fixed schema.
    data: Map<String, Value>,
    spec: &'s DirectiveSpec,
}

impl<'s> Shaper<'_, 's> {
    fn finish(self, index: usize, directive: Option<Directive>) -> Normalized {
        let directive = if self.issues.is_empty() { directive } else { None };
        Normalized {
            index,
            directive,
            issues: self.issues,
            record: self.record,
        }
    }

    fn invalid(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(DirectiveIssue::Invalid {
            field: field.into(),
            message: message.into(),
        });
    }

    fn enum_field<T>(
        &mut self,
        field: &str,
        raw: Option<&Value>,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> Option<T> {
        let text = match raw {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.trim()).filter(|text| !text.is_empty()),
            Some(other) => {
                self.invalid(field, format!("expected a string, got {other}"));
                return None;
            }
        };
        match text {
            None => {
                self.invalid(field, format!("missing (expected {expected})"));
                None
            }
            Some(raw) => {
                let parsed = parse(raw);
                if parsed.is_none() {
                    self.invalid(field, format!("unknown value `{raw}` (expected {expected})"));
                }
                parsed
            }
        }
    }

    fn load_data(&mut self) {
        let spec = self.spec;
        match spec.data.as_ref() {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => self.data = map.clone(),
            Some(other) => self.invalid("data", format!("expected an object, got {other}")),
        }
    }

    fn user_id(&mut self) -> Option<i64> {
        let spec = self.spec;
        let raw = spec.user_id.as_ref()?;
        match as_int(raw) {
            Ok(id) => id,
            Err(message) => {
                self.invalid("user_id", message);
                None
            }
        }
    }

    /// A wire list field; `null` counts as absent.
    fn list(&mut self, field: &str, raw: Option<&'s Value>) -> Option<&'s [Value]> {
        match raw? {
            Value::Null => None,
            Value::Array(items) => Some(items.as_slice()),
            other => {
                self.invalid(field, format!("expected a list, got {other}"));
                None
            }
        }
    }

    fn resolve(&mut self, field: &str, reference: EntityRef, kind: ObjectKind) -> Option<EntityId> {
        if !reference.matches_kind(kind) {
            self.invalid(field, format!("`{reference}` does not name a {kind}"));
            return None;
        }
        match self.resolver.resolve(reference) {
            Ok(id) => Some(id),
            Err(ResolveError::Unresolved(temp)) => {
                self.issues.push(DirectiveIssue::Unresolved {
                    field: field.to_string(),
                    reference: temp,
                });
                None
            }
            Err(err) => {
                self.invalid(field, err.to_string());
                None
            }
        }
    }

    fn reference(&mut self, field: &str, raw: &Value, kind: ObjectKind) -> Option<EntityId> {
        let parsed = match raw {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| EntityId::try_from(n).ok())
                .map(EntityRef::Real)
                .ok_or_else(|| format!("`{n}` is not a valid id")),
            Value::String(s) => EntityRef::parse(s).map_err(|err| err.to_string()),
            other => Err(format!("expected an id, got {other}")),
        };
        match parsed {
            Ok(reference) => self.resolve(field, reference, kind),
            Err(message) => {
                self.invalid(field, message);
                None
            }
        }
    }

    fn target(&mut self, action: Action, object: ObjectKind) -> Option<Target> {
        let spec = self.spec;
        let raw = spec.object_id.as_ref().filter(|raw| !raw.is_null());
        match action {
            Action::Add => {
                let Some(raw) = raw else {
                    return Some(Target::New(None));
                };
                let Some(text) = value_as_text(raw) else {
                    self.invalid("object_id", format!("expected a string, got {raw}"));
                    return None;
                };
                match TempRef::parse(&text) {
                    Some(temp) if temp.kind() != object => {
                        self.invalid("object_id", format!("temporary id `{temp}` does not name a {object}"));
                    }
                    Some(temp) if self.resolver.contains(temp) => {
                        self.invalid("object_id", format!("temporary id `{temp}` is already used in this batch"));
                    }
                    Some(temp) => return Some(Target::New(Some(temp))),
                    None => self.invalid(
                        "object_id",
                        format!(
                            "`{text}` is not a temporary id (add directives use {}-<number>)",
                            object.temp_prefix()
                        ),
                    ),
                }
                None
            }
            Action::Edit | Action::Delete => {
                let Some(raw) = raw else {
                    self.invalid("object_id", format!("required for {action}"));
                    return None;
                };
                let id = self.reference("object_id", raw, object)?;
                self.record.set_object_id(id);
                Some(Target::Existing(id))
            }
        }
    }

    fn scope(&mut self) -> Scope {
        let spec = self.spec;
        let layer = self.scope_value("layer", spec.layer.as_ref(), ObjectKind::Layer);
        let period = self.scope_value("period", spec.period.as_ref(), ObjectKind::Period);
        let type_ref = self.scope_value("type", spec.type_ref.as_ref(), ObjectKind::Type);
        let shape = self.scope_value("shape", spec.shape.as_ref(), ObjectKind::Shape);

        let rewrite = |value: &Option<ScopeValue>, slot: &mut Option<Value>| {
            if let Some(ScopeValue::Id(id)) = value {
                *slot = Some(Value::from(*id));
            }
        };
        let record = &mut self.record.directive;
        rewrite(&layer, &mut record.layer);
        rewrite(&period, &mut record.period);
        rewrite(&type_ref, &mut record.type_ref);
        rewrite(&shape, &mut record.shape);

        Scope {
            layer,
            period,
            type_ref,
            shape,
        }
    }

    fn scope_value(&mut self, field: &str, raw: Option<&Value>, kind: ObjectKind) -> Option<ScopeValue> {
        match raw? {
            Value::Null => None,
            raw @ Value::Number(_) => self.reference(field, raw, kind).map(ScopeValue::Id),
            Value::String(s) => match EntityRef::parse(s) {
                Ok(reference) if reference.matches_kind(kind) => {
                    self.resolve(field, reference, kind).map(ScopeValue::Id)
                }
                _ => Some(ScopeValue::Label(s.clone())),
            },
            other => Some(ScopeValue::Label(other.to_string())),
        }
    }

    fn payload(&mut self, action: Action, object: ObjectKind) -> Payload {
        match object {
            ObjectKind::Node => Payload::Node(self.node(action)),
            ObjectKind::Way => Payload::Way(self.way(action)),
            ObjectKind::Shape => Payload::Shape(self.shape(action)),
            ObjectKind::Layer => Payload::Layer(self.layer(action)),
            ObjectKind::Type => Payload::Type(self.type_payload(action)),
            ObjectKind::Period => Payload::Period(self.period(action)),
            ObjectKind::Source => Payload::Source(self.source(action)),
        }
    }

    fn delete_payload(&mut self, object: ObjectKind) -> Payload {
        let spec = self.spec;
        let (field, raw) = match object {
            ObjectKind::Way => ("way_nodes", spec.way_nodes.as_ref()),
            ObjectKind::Shape => ("shape_relations", spec.shape_relations.as_ref()),
            _ => return Payload::Delete { detach: None },
        };
        let Some(entries) = self.list(field, raw) else {
            return Payload::Delete { detach: None };
        };
        if entries.is_empty() {
            self.invalid(field, "empty list names nothing to detach");
            return Payload::Delete { detach: None };
        }
        let mut detach = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match parse_sequence(entry) {
                Ok(seq) => detach.push(seq),
                Err(err) => self.invalid(format!("{field}[{i}]"), err.to_string()),
            }
        }
        Payload::Delete {
            detach: Some(detach),
        }
    }

    // -- data fields ---------------------------------------------------------

    fn take(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key).filter(|value| !value.is_null())
    }

    fn take_with<T>(&mut self, key: &str, coerce: impl Fn(&Value) -> Result<Option<T>, String>) -> Option<T> {
        let value = self.take(key)?;
        match coerce(&value) {
            Ok(out) => out,
            Err(message) => {
                self.invalid(format!("data.{key}"), message);
                None
            }
        }
    }

    fn take_ref(&mut self, key: &str, kind: ObjectKind) -> Option<EntityId> {
        let value = self.take(key)?;
        let id = self.reference(&format!("data.{key}"), &value, kind)?;
        self.rewrite_data(key, Value::from(id));
        Some(id)
    }

    fn take_refs(&mut self, key: &str, kind: ObjectKind) -> Option<Vec<EntityId>> {
        let value = self.take(key)?;
        let mut ids = Vec::new();
        for (i, item) in as_list(&value).iter().enumerate() {
            if let Some(id) = self.reference(&format!("data.{key}[{i}]"), item, kind)
                && !ids.contains(&id)
            {
                ids.push(id);
            }
        }
        self.rewrite_data(key, Value::from(ids.clone()));
        Some(ids)
    }

    fn rewrite_data(&mut self, key: &str, value: Value) {
        let data = self
            .record
            .directive
            .data
            .get_or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = data {
            map.insert(key.to_string(), value);
        }
    }

    fn require(&mut self, action: Action, key: &str, value: &Option<String>) {
        if action == Action::Add && value.as_deref().is_none_or(|v| v.trim().is_empty()) {
            self.invalid(format!("data.{key}"), "required for add");
        }
    }

    /// Everything left in `data` goes to the extensible attribute store.
    fn attributes(&mut self) -> AttributePatch {
        let mut patch = AttributePatch::default();
        for (key, value) in std::mem::take(&mut self.data) {
            if key == "id" {
                self.invalid("data.id", "ids are assigned by the store");
                continue;
            }
            if value.is_null() {
                patch.remove(key);
                continue;
            }
            match AttrValue::from_json(&value) {
                Some(attr) => patch.set(key, attr),
                None => self.invalid(
                    format!("data.{key}"),
                    "attribute values must be strings, numbers or booleans",
                ),
            }
        }
        patch
    }

    // -- per-kind shaping ----------------------------------------------------

    fn position(&mut self, required: bool) -> Option<LonLat> {
        let spec = self.spec;
        let Some(raw) = spec.geometry.as_ref().filter(|raw| !raw.is_null()) else {
            if required {
                self.invalid("geometry", "required for add node");
            }
            return None;
        };
        let checked = as_pair(raw)
            .ok_or(GeometryError::NotAPair)
            .and_then(|(lon, lat)| LonLat::try_new(lon, lat));
        match checked {
            Ok(position) => Some(position),
            Err(err) => {
                self.invalid("geometry", err.to_string());
                None
            }
        }
    }

    fn members(&mut self, kind: ObjectKind) -> Option<Vec<MemberRef>> {
        let spec = self.spec;
        let entries = self.list("way_nodes", spec.way_nodes.as_ref())?;
        let mut members = Vec::with_capacity(entries.len());
        let mut rewritten = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let field = format!("way_nodes[{i}]");
            let (sequence, reference) = match parse_member(entry) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.invalid(field, err.to_string());
                    rewritten.push(entry.clone());
                    continue;
                }
            };
            match self.resolve(&field, reference, kind) {
                Some(target) => {
                    rewritten.push(Value::String(match sequence {
                        Some(seq) => format!("{seq}-{target}"),
                        None => target.to_string(),
                    }));
                    members.push(MemberRef { sequence, target });
                }
                None => rewritten.push(entry.clone()),
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for member in &members {
            if let Some(seq) = member.sequence
                && !seen.insert(seq)
            {
                self.invalid("way_nodes", format!("sequence {seq} appears twice"));
            }
        }
        self.record.directive.way_nodes = Some(Value::Array(rewritten));
        Some(members)
    }

    fn node(&mut self, action: Action) -> NodePayload {
        let position = self.position(action == Action::Add);
        let ways = self.members(ObjectKind::Way).unwrap_or_default();
        NodePayload {
            position,
            ways,
            attributes: self.attributes(),
        }
    }

    fn way(&mut self, action: Action) -> WayPayload {
        let members = self.members(ObjectKind::Node);
        let spec = self.spec;
        match spec.way_nodes.as_ref() {
            None | Some(Value::Null) if action == Action::Add => self.invalid("way_nodes", "required for add way"),
            Some(Value::Array(raw)) if raw.len() < 2 => self.invalid("way_nodes", "a way needs at least two nodes"),
            _ => {}
        }
        WayPayload {
            members,
            attributes: self.attributes(),
        }
    }

    fn relations(&mut self, action: Action) -> Option<Vec<RelationSpec>> {
        let spec = self.spec;
        let entries = self.list("shape_relations", spec.shape_relations.as_ref())?;
        let mut relations = Vec::with_capacity(entries.len());
        let mut rewritten = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let field = format!("shape_relations[{i}]");
            let parts = match parse_relation(entry) {
                Ok(parts) => parts,
                Err(err) => {
                    self.invalid(field, err.to_string());
                    rewritten.push(entry.clone());
                    continue;
                }
            };
            let Some(relation_type) = RelationType::parse(&parts.relation_type) else {
                self.invalid(
                    field,
                    format!("unknown relation type `{}` (expected Node, Way or Shape)", parts.relation_type),
                );
                rewritten.push(entry.clone());
                continue;
            };
            let role = match parts.role.as_deref() {
                None => RelationRole::default_for(relation_type),
                Some(raw) => match RelationRole::parse(raw) {
                    Some(role) => role,
                    None => {
                        self.invalid(
                            field,
                            format!("unknown role `{raw}` (expected outer, inner, point, center or line)"),
                        );
                        rewritten.push(entry.clone());
                        continue;
                    }
                },
            };
            let Some(target) = self.resolve(&field, parts.reference, relation_type.object_kind()) else {
                rewritten.push(entry.clone());
                continue;
            };
            let sequence = match (parts.sequence, action) {
                (Some(seq), _) => Some(seq),
                (None, Action::Add) => u32::try_from(i).ok(),
                (None, _) => None,
            };
            rewritten.push(Value::String(match sequence {
                Some(seq) => format!("{seq}-{relation_type}-{role}-{target}"),
                None => format!("{relation_type}-{role}-{target}"),
            }));
            relations.push(RelationSpec {
                relation_type,
                role,
                target,
                sequence,
            });
        }
        self.record.directive.shape_relations = Some(Value::Array(rewritten));
        Some(relations)
    }

    fn date(&mut self, prefix: &str, defaults: bool) -> DateParts {
        let year = self.take_with(&format!("{prefix}_year"), as_year);
        let month = self.take_with(&format!("{prefix}_month"), |v| as_bounded(v, 1, 12));
        let day = self.take_with(&format!("{prefix}_day"), |v| as_bounded(v, 1, 31));
        let fill = defaults && year.is_some();
        DateParts {
            year,
            month: month.or(fill.then_some(1)),
            day: day.or(fill.then_some(1)),
        }
    }

    fn shape(&mut self, action: Action) -> ShapePayload {
        let add = action == Action::Add;
        let type_id = self.take_ref("type_id", ObjectKind::Type);
        let periods = self.take_refs("periods", ObjectKind::Period);
        let tags = self.take_refs("tags", ObjectKind::Type);
        let start = self.date("start", add);
        let end = self.date("end", add);
        if let (Some(from), Some(to)) = (start.key(), end.key())
            && from > to
        {
            self.invalid("data.end_year", "start date is after end date");
        }
        let relations = self.relations(action);
        if add && is_blank_list(self.spec.shape_relations.as_ref()) {
            self.invalid("shape_relations", "no nodes, ways, or shapes");
        }
        ShapePayload {
            type_id,
            periods,
            tags,
            start,
            end,
            relations,
            attributes: self.attributes(),
        }
    }

    fn layer(&mut self, action: Action) -> LayerPayload {
        let name = self.take_with("name", as_text);
        let short_name = self.take_with("short_name", as_text);
        self.require(action, "name", &name);
        self.require(action, "short_name", &short_name);
        LayerPayload {
            name,
            short_name,
            level: self.take_with("level", as_int),
            color1: self.take_with("color1", as_text),
            color2: self.take_with("color2", as_text),
            attributes: self.attributes(),
        }
    }

    fn type_payload(&mut self, action: Action) -> TypePayload {
        let name = self.take_with("name", as_text);
        self.require(action, "name", &name);
        TypePayload {
            name,
            layer_id: self.take_ref("layer_id", ObjectKind::Layer),
            attributes: self.attributes(),
        }
    }

    fn period(&mut self, action: Action) -> PeriodPayload {
        let name = self.take_with("name", as_text);
        self.require(action, "name", &name);
        let start_year = self.take_with("start_year", as_year);
        let end_year = self.take_with("end_year", as_year);
        if let (Some(start), Some(end)) = (start_year, end_year)
            && start > end
        {
            self.invalid("data.end_year", format!("start_year {start} is after end_year {end}"));
        }
        PeriodPayload {
            name,
            start_year,
            end_year,
            attributes: self.attributes(),
        }
    }

    fn source(&mut self, action: Action) -> SourcePayload {
        let name = self.take_with("name", as_text);
        self.require(action, "name", &name);
        SourcePayload {
            name,
            source: self.take_with("source", as_text),
            attributes: self.attributes(),
        }
    }
}
