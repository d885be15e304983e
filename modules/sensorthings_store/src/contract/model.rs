//! Entity model of the SensorThings data model
//!
//! The set of entity types is closed. Each type declares its entity properties, its
//! navigation properties and what must be present before it can be created.

use std::fmt;

/// Entity types of the data model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Thing,
    Location,
    HistoricalLocation,
    Datastream,
    MultiDatastream,
    Observation,
    ObservedProperty,
    Sensor,
    FeatureOfInterest,
    Actuator,
    Task,
    TaskingCapability,
}

impl EntityType {
    /// All entity types, in table registration order
    pub const ALL: [EntityType; 12] = [
        EntityType::Thing,
        EntityType::Location,
        EntityType::HistoricalLocation,
        EntityType::Datastream,
        EntityType::MultiDatastream,
        EntityType::Observation,
        EntityType::ObservedProperty,
        EntityType::Sensor,
        EntityType::FeatureOfInterest,
        EntityType::Actuator,
        EntityType::Task,
        EntityType::TaskingCapability,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Thing => "Thing",
            Self::Location => "Location",
            Self::HistoricalLocation => "HistoricalLocation",
            Self::Datastream => "Datastream",
            Self::MultiDatastream => "MultiDatastream",
            Self::Observation => "Observation",
            Self::ObservedProperty => "ObservedProperty",
            Self::Sensor => "Sensor",
            Self::FeatureOfInterest => "FeatureOfInterest",
            Self::Actuator => "Actuator",
            Self::Task => "Task",
            Self::TaskingCapability => "TaskingCapability",
        }
    }

    /// Entity set name as used in resource paths
    pub fn plural(self) -> &'static str {
        match self {
            Self::Thing => "Things",
            Self::Location => "Locations",
            Self::HistoricalLocation => "HistoricalLocations",
            Self::Datastream => "Datastreams",
            Self::MultiDatastream => "MultiDatastreams",
            Self::Observation => "Observations",
            Self::ObservedProperty => "ObservedProperties",
            Self::Sensor => "Sensors",
            Self::FeatureOfInterest => "FeaturesOfInterest",
            Self::Actuator => "Actuators",
            Self::Task => "Tasks",
            Self::TaskingCapability => "TaskingCapabilities",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name || t.plural() == name)
    }

    pub fn entity_properties(self) -> &'static [EntityProperty] {
        use EntityProperty as P;
        match self {
            Self::Thing => &[P::Id, P::Name, P::Description, P::Properties],
            Self::Location => &[
                P::Id,
                P::Name,
                P::Description,
                P::EncodingType,
                P::Location,
                P::Properties,
            ],
            Self::HistoricalLocation => &[P::Id, P::Time],
            Self::Datastream => &[
                P::Id,
                P::Name,
                P::Description,
                P::ObservationType,
                P::UnitOfMeasurement,
                P::ObservedArea,
                P::PhenomenonTime,
                P::ResultTime,
                P::Properties,
            ],
            Self::MultiDatastream => &[
                P::Id,
                P::Name,
                P::Description,
                P::ObservationType,
                P::MultiObservationDataTypes,
                P::UnitOfMeasurements,
                P::ObservedArea,
                P::PhenomenonTime,
                P::ResultTime,
                P::Properties,
            ],
            Self::Observation => &[
                P::Id,
                P::PhenomenonTime,
                P::ResultTime,
                P::Result,
                P::ResultQuality,
                P::ValidTime,
                P::Parameters,
            ],
            Self::ObservedProperty => &[
                P::Id,
                P::Name,
                P::Definition,
                P::Description,
                P::Properties,
            ],
            Self::Sensor | Self::Actuator => &[
                P::Id,
                P::Name,
                P::Description,
                P::EncodingType,
                P::Metadata,
                P::Properties,
            ],
            Self::FeatureOfInterest => &[
                P::Id,
                P::Name,
                P::Description,
                P::EncodingType,
                P::Feature,
                P::Properties,
            ],
            Self::Task => &[P::Id, P::CreationTime, P::TaskingParameters],
            Self::TaskingCapability => &[
                P::Id,
                P::Name,
                P::Description,
                P::TaskingParameters,
                P::Properties,
            ],
        }
    }

    pub fn navigation_properties(self) -> &'static [NavProperty] {
        use NavProperty as N;
        match self {
            Self::Thing => &[
                N::Datastreams,
                N::MultiDatastreams,
                N::Locations,
                N::HistoricalLocations,
                N::TaskingCapabilities,
            ],
            Self::Location => &[N::Things, N::HistoricalLocations],
            Self::HistoricalLocation => &[N::Thing, N::Locations],
            Self::Datastream => &[N::Thing, N::Sensor, N::ObservedProperty, N::Observations],
            Self::MultiDatastream => &[N::Thing, N::Sensor, N::ObservedProperties, N::Observations],
            Self::Observation => &[N::Datastream, N::MultiDatastream, N::FeatureOfInterest],
            Self::ObservedProperty | Self::Sensor => &[N::Datastreams, N::MultiDatastreams],
            Self::FeatureOfInterest => &[N::Observations],
            Self::Actuator => &[N::TaskingCapabilities],
            Self::Task => &[N::TaskingCapability],
            Self::TaskingCapability => &[N::Thing, N::Actuator, N::Tasks],
        }
    }

    /// Entity properties that must be present when an entity is created
    pub fn required_properties(self) -> &'static [EntityProperty] {
        use EntityProperty as P;
        match self {
            Self::Thing => &[P::Name, P::Description],
            Self::Location => &[P::Name, P::Description, P::EncodingType, P::Location],
            Self::HistoricalLocation => &[P::Time],
            Self::Datastream => &[
                P::Name,
                P::Description,
                P::ObservationType,
                P::UnitOfMeasurement,
            ],
            Self::MultiDatastream => &[
                P::Name,
                P::Description,
                P::MultiObservationDataTypes,
                P::UnitOfMeasurements,
            ],
            Self::Observation => &[P::PhenomenonTime, P::Result],
            Self::ObservedProperty => &[P::Name, P::Definition, P::Description],
            Self::Sensor | Self::Actuator => {
                &[P::Name, P::Description, P::EncodingType, P::Metadata]
            }
            Self::FeatureOfInterest => &[P::Name, P::Description, P::EncodingType, P::Feature],
            Self::Task => &[P::TaskingParameters],
            Self::TaskingCapability => &[P::Name, P::Description, P::TaskingParameters],
        }
    }

    /// To-one navigation properties that must resolve when an entity is created
    pub fn required_navigation(self) -> &'static [NavProperty] {
        use NavProperty as N;
        match self {
            Self::HistoricalLocation => &[N::Thing],
            Self::Datastream => &[N::Thing, N::Sensor, N::ObservedProperty],
            Self::MultiDatastream => &[N::Thing, N::Sensor],
            Self::Observation => &[N::FeatureOfInterest],
            Self::Task => &[N::TaskingCapability],
            Self::TaskingCapability => &[N::Thing, N::Actuator],
            _ => &[],
        }
    }

    pub fn has_navigation(self, nav: NavProperty) -> bool {
        self.navigation_properties().contains(&nav)
    }

    pub fn has_property(self, property: EntityProperty) -> bool {
        self.entity_properties().contains(&property)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity (non-navigation) properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityProperty {
    Id,
    Name,
    Description,
    Definition,
    EncodingType,
    Metadata,
    Properties,
    Location,
    Feature,
    Time,
    PhenomenonTime,
    ResultTime,
    ValidTime,
    Result,
    ResultQuality,
    Parameters,
    ObservationType,
    MultiObservationDataTypes,
    UnitOfMeasurement,
    UnitOfMeasurements,
    ObservedArea,
    TaskingParameters,
    CreationTime,
}

impl EntityProperty {
    pub const ALL: [EntityProperty; 23] = [
        EntityProperty::Id,
        EntityProperty::Name,
        EntityProperty::Description,
        EntityProperty::Definition,
        EntityProperty::EncodingType,
        EntityProperty::Metadata,
        EntityProperty::Properties,
        EntityProperty::Location,
        EntityProperty::Feature,
        EntityProperty::Time,
        EntityProperty::PhenomenonTime,
        EntityProperty::ResultTime,
        EntityProperty::ValidTime,
        EntityProperty::Result,
        EntityProperty::ResultQuality,
        EntityProperty::Parameters,
        EntityProperty::ObservationType,
        EntityProperty::MultiObservationDataTypes,
        EntityProperty::UnitOfMeasurement,
        EntityProperty::UnitOfMeasurements,
        EntityProperty::ObservedArea,
        EntityProperty::TaskingParameters,
        EntityProperty::CreationTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Definition => "definition",
            Self::EncodingType => "encodingType",
            Self::Metadata => "metadata",
            Self::Properties => "properties",
            Self::Location => "location",
            Self::Feature => "feature",
            Self::Time => "time",
            Self::PhenomenonTime => "phenomenonTime",
            Self::ResultTime => "resultTime",
            Self::ValidTime => "validTime",
            Self::Result => "result",
            Self::ResultQuality => "resultQuality",
            Self::Parameters => "parameters",
            Self::ObservationType => "observationType",
            Self::MultiObservationDataTypes => "multiObservationDataTypes",
            Self::UnitOfMeasurement => "unitOfMeasurement",
            Self::UnitOfMeasurements => "unitOfMeasurements",
            Self::ObservedArea => "observedArea",
            Self::TaskingParameters => "taskingParameters",
            Self::CreationTime => "creationTime",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if name == "@iot.id" {
            return Some(Self::Id);
        }
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for EntityProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Navigation properties (to-one references and to-many collections)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NavProperty {
    Datastream,
    Datastreams,
    MultiDatastream,
    MultiDatastreams,
    Thing,
    Things,
    Locations,
    HistoricalLocations,
    Sensor,
    ObservedProperty,
    ObservedProperties,
    Observations,
    FeatureOfInterest,
    Actuator,
    TaskingCapability,
    TaskingCapabilities,
    Tasks,
}

impl NavProperty {
    pub const ALL: [NavProperty; 17] = [
        NavProperty::Datastream,
        NavProperty::Datastreams,
        NavProperty::MultiDatastream,
        NavProperty::MultiDatastreams,
        NavProperty::Thing,
        NavProperty::Things,
        NavProperty::Locations,
        NavProperty::HistoricalLocations,
        NavProperty::Sensor,
        NavProperty::ObservedProperty,
        NavProperty::ObservedProperties,
        NavProperty::Observations,
        NavProperty::FeatureOfInterest,
        NavProperty::Actuator,
        NavProperty::TaskingCapability,
        NavProperty::TaskingCapabilities,
        NavProperty::Tasks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Datastream => "Datastream",
            Self::Datastreams => "Datastreams",
            Self::MultiDatastream => "MultiDatastream",
            Self::MultiDatastreams => "MultiDatastreams",
            Self::Thing => "Thing",
            Self::Things => "Things",
            Self::Locations => "Locations",
            Self::HistoricalLocations => "HistoricalLocations",
            Self::Sensor => "Sensor",
            Self::ObservedProperty => "ObservedProperty",
            Self::ObservedProperties => "ObservedProperties",
            Self::Observations => "Observations",
            Self::FeatureOfInterest => "FeatureOfInterest",
            Self::Actuator => "Actuator",
            Self::TaskingCapability => "TaskingCapability",
            Self::TaskingCapabilities => "TaskingCapabilities",
            Self::Tasks => "Tasks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.name() == name)
    }

    /// Entity type on the far side of the navigation
    pub fn target(self) -> EntityType {
        match self {
            Self::Datastream | Self::Datastreams => EntityType::Datastream,
            Self::MultiDatastream | Self::MultiDatastreams => EntityType::MultiDatastream,
            Self::Thing | Self::Things => EntityType::Thing,
            Self::Locations => EntityType::Location,
            Self::HistoricalLocations => EntityType::HistoricalLocation,
            Self::Sensor => EntityType::Sensor,
            Self::ObservedProperty | Self::ObservedProperties => EntityType::ObservedProperty,
            Self::Observations => EntityType::Observation,
            Self::FeatureOfInterest => EntityType::FeatureOfInterest,
            Self::Actuator => EntityType::Actuator,
            Self::TaskingCapability | Self::TaskingCapabilities => EntityType::TaskingCapability,
            Self::Tasks => EntityType::Task,
        }
    }

    /// True for to-many navigation properties
    pub fn is_set(self) -> bool {
        matches!(
            self,
            Self::Datastreams
                | Self::MultiDatastreams
                | Self::Things
                | Self::Locations
                | Self::HistoricalLocations
                | Self::ObservedProperties
                | Self::Observations
                | Self::TaskingCapabilities
                | Self::Tasks
        )
    }

    /// The navigation property leading back from the target to `owner`.
    pub fn inverse(self, owner: EntityType) -> Option<NavProperty> {
        self.target()
            .navigation_properties()
            .iter()
            .copied()
            .find(|nav| nav.target() == owner)
    }
}

impl fmt::Display for NavProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any property an entity can carry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Entity(EntityProperty),
    Navigation(NavProperty),
    /// A column registered by a deployment-specific schema extension
    Extension(String),
}

impl From<EntityProperty> for Property {
    fn from(p: EntityProperty) -> Self {
        Self::Entity(p)
    }
}

impl From<NavProperty> for Property {
    fn from(n: NavProperty) -> Self {
        Self::Navigation(n)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(p) => p.fmt(f),
            Self::Navigation(n) => n.fmt(f),
            Self::Extension(name) => f.write_str(name),
        }
    }
}
