//! Entity kinds managed by the back-office and the per-kind configuration
//! that drives the generic table, decision dialog and form flows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Miner,
    Company,
    Section,
    OreReceival,
    SecurityDispatch,
    Transport,
    Driver,
    Vehicle,
    TrainingRecord,
    Tax,
}

/// A table column: which record field it shows and its header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub field: &'static str,
    pub header: &'static str,
}

/// Optional detail sub-sections. A tab is only offered when the record
/// carries non-empty data in its source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailTab {
    Documents,
    TeamMembers,
    Images,
    Notes,
}

impl DetailTab {
    pub fn source_field(&self) -> &'static str {
        match self {
            DetailTab::Documents => "documents",
            DetailTab::TeamMembers => "teamMembers",
            DetailTab::Images => "images",
            DetailTab::Notes => "additionalNotes",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DetailTab::Documents => "Documents",
            DetailTab::TeamMembers => "Team members",
            DetailTab::Images => "Images",
            DetailTab::Notes => "Additional notes",
        }
    }
}

#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// REST collection path, relative to the API base URL.
    pub path: &'static str,
    pub label: &'static str,
    /// Carries a review status and accepts approve/reject/push-back.
    pub reviewable: bool,
    pub deletable: bool,
    pub columns: &'static [Column],
    /// Candidates for default newest-first ordering, in priority order.
    pub timestamp_fields: &'static [&'static str],
    /// Field behind the position/role dropdown filter, if the table has one.
    pub role_field: Option<&'static str>,
    pub tabs: &'static [DetailTab],
    /// Other lists that go stale when a record of this kind changes.
    pub invalidates: &'static [EntityKind],
    /// A successful decision asks the host to reload the whole page rather
    /// than only refreshing the list.
    pub reload_after_decision: bool,
}

const TIMESTAMPS: &[&str] = &["createdAt", "created_at", "date", "timestamp"];

static MINER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Miner,
    path: "miners",
    label: "Miners",
    reviewable: true,
    deletable: false,
    columns: &[
        Column { field: "name", header: "Name" },
        Column { field: "surname", header: "Surname" },
        Column { field: "nationalId", header: "National ID" },
        Column { field: "position", header: "Position" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: Some("position"),
    tabs: &[DetailTab::TeamMembers, DetailTab::Documents, DetailTab::Notes],
    invalidates: &[EntityKind::Section],
    reload_after_decision: false,
};

static COMPANY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Company,
    path: "companies",
    label: "Companies",
    reviewable: true,
    deletable: false,
    columns: &[
        Column { field: "companyName", header: "Company" },
        Column { field: "registrationNumber", header: "Registration No." },
        Column { field: "address", header: "Address" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Documents, DetailTab::TeamMembers, DetailTab::Notes],
    invalidates: &[EntityKind::Section],
    reload_after_decision: false,
};

static SECTION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Section,
    path: "sections",
    label: "Sections",
    reviewable: true,
    deletable: false,
    columns: &[
        Column { field: "sectionName", header: "Section" },
        Column { field: "shaftNumbers", header: "Shafts" },
        Column { field: "numberOfShafts", header: "No. of shafts" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Documents, DetailTab::Notes],
    invalidates: &[],
    reload_after_decision: false,
};

static ORE_RECEIVAL: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::OreReceival,
    path: "ore-receivals",
    label: "Ore receivals",
    reviewable: true,
    deletable: false,
    columns: &[
        Column { field: "oreId", header: "Ore ID" },
        Column { field: "shaftNumbers", header: "Shaft" },
        Column { field: "weight", header: "Weight (t)" },
        Column { field: "date", header: "Date" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Images, DetailTab::Notes],
    invalidates: &[EntityKind::SecurityDispatch, EntityKind::Transport],
    reload_after_decision: false,
};

static SECURITY_DISPATCH: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::SecurityDispatch,
    path: "security-dispatches",
    label: "Security dispatches",
    reviewable: true,
    deletable: false,
    columns: &[
        Column { field: "oreId", header: "Ore ID" },
        Column { field: "vehicleRegistration", header: "Vehicle" },
        Column { field: "driverName", header: "Driver" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Images, DetailTab::Notes],
    invalidates: &[EntityKind::Transport],
    reload_after_decision: true,
};

static TRANSPORT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Transport,
    path: "transports",
    label: "Transport",
    reviewable: false,
    deletable: true,
    columns: &[
        Column { field: "oreId", header: "Ore ID" },
        Column { field: "vehicleRegistration", header: "Vehicle" },
        Column { field: "driverName", header: "Driver" },
        Column { field: "destination", header: "Destination" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Notes],
    invalidates: &[],
    reload_after_decision: false,
};

static DRIVER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Driver,
    path: "drivers",
    label: "Drivers",
    reviewable: true,
    deletable: true,
    columns: &[
        Column { field: "name", header: "Name" },
        Column { field: "phoneNumber", header: "Phone" },
        Column { field: "licenseNumber", header: "Licence" },
        Column { field: "position", header: "Position" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: Some("position"),
    tabs: &[DetailTab::Documents],
    invalidates: &[EntityKind::Transport],
    reload_after_decision: false,
};

static VEHICLE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Vehicle,
    path: "vehicles",
    label: "Vehicles",
    reviewable: true,
    deletable: true,
    columns: &[
        Column { field: "registrationNumber", header: "Registration" },
        Column { field: "make", header: "Make" },
        Column { field: "vehicleType", header: "Type" },
        Column { field: "status", header: "Status" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::Images, DetailTab::Documents],
    invalidates: &[EntityKind::Transport],
    reload_after_decision: false,
};

static TRAINING_RECORD: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TrainingRecord,
    path: "training-records",
    label: "Training records",
    reviewable: false,
    deletable: true,
    columns: &[
        Column { field: "trainingType", header: "Training" },
        Column { field: "trainer", header: "Trainer" },
        Column { field: "scheduledDate", header: "Date" },
        Column { field: "location", header: "Location" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[DetailTab::TeamMembers, DetailTab::Notes],
    invalidates: &[],
    reload_after_decision: false,
};

static TAX: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Tax,
    path: "taxes",
    label: "Taxes",
    reviewable: false,
    deletable: false,
    columns: &[
        Column { field: "taxType", header: "Tax" },
        Column { field: "taxRate", header: "Rate (%)" },
        Column { field: "location", header: "Location" },
        Column { field: "description", header: "Description" },
    ],
    timestamp_fields: TIMESTAMPS,
    role_field: None,
    tabs: &[],
    invalidates: &[],
    reload_after_decision: false,
};

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Miner,
        EntityKind::Company,
        EntityKind::Section,
        EntityKind::OreReceival,
        EntityKind::SecurityDispatch,
        EntityKind::Transport,
        EntityKind::Driver,
        EntityKind::Vehicle,
        EntityKind::TrainingRecord,
        EntityKind::Tax,
    ];

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Miner => &MINER,
            EntityKind::Company => &COMPANY,
            EntityKind::Section => &SECTION,
            EntityKind::OreReceival => &ORE_RECEIVAL,
            EntityKind::SecurityDispatch => &SECURITY_DISPATCH,
            EntityKind::Transport => &TRANSPORT,
            EntityKind::Driver => &DRIVER,
            EntityKind::Vehicle => &VEHICLE,
            EntityKind::TrainingRecord => &TRAINING_RECORD,
            EntityKind::Tax => &TAX,
        }
    }

    /// Kebab-case name used on the command line and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Miner => "miner",
            EntityKind::Company => "company",
            EntityKind::Section => "section",
            EntityKind::OreReceival => "ore-receival",
            EntityKind::SecurityDispatch => "security-dispatch",
            EntityKind::Transport => "transport",
            EntityKind::Driver => "driver",
            EntityKind::Vehicle => "vehicle",
            EntityKind::TrainingRecord => "training-record",
            EntityKind::Tax => "tax",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        match wanted.as_str() {
            // "shaft" is what the mine floor calls a section
            "shaft" | "shafts" => return Ok(EntityKind::Section),
            _ => {}
        }
        EntityKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted || k.descriptor().path == wanted)
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}
