// First matching rule wins; `<type>` beats the name heuristic.

use crate::model::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Box,
    Cylinder,
    Sphere,
}

impl Primitive {
    pub fn tag(self) -> &'static str {
        match self {
            Primitive::Box => "box",
            Primitive::Cylinder => "cylinder",
            Primitive::Sphere => "sphere",
        }
    }

    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Wall | EntityKind::Box => Primitive::Box,
            EntityKind::Cylinder => Primitive::Cylinder,
            EntityKind::Sphere => Primitive::Sphere,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KindEvidence<'a> {
    pub model_name: &'a str,
    pub type_tag: Option<EntityKind>,
    pub primitive: Option<Primitive>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindRule {
    ExplicitTag,
    BoxNamedWall,
    PrimitiveShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: EntityKind,
    pub rule: KindRule,
}

pub const KIND_RULES: [KindRule; 3] = [
    KindRule::ExplicitTag,
    KindRule::BoxNamedWall,
    KindRule::PrimitiveShape,
];

impl KindRule {
    fn apply(self, evidence: &KindEvidence<'_>) -> Option<EntityKind> {
        match self {
            KindRule::ExplicitTag => evidence.type_tag,
            KindRule::BoxNamedWall => (evidence.primitive == Some(Primitive::Box)
                && evidence.model_name.contains("wall"))
            .then_some(EntityKind::Wall),
            KindRule::PrimitiveShape => evidence.primitive.map(|primitive| match primitive {
                Primitive::Box => EntityKind::Box,
                Primitive::Cylinder => EntityKind::Cylinder,
                Primitive::Sphere => EntityKind::Sphere,
            }),
        }
    }
}

pub fn classify_kind(evidence: &KindEvidence<'_>) -> Option<Classification> {
    KIND_RULES.iter().find_map(|rule| {
        rule.apply(evidence)
            .map(|kind| Classification { kind, rule: *rule })
    })
}
