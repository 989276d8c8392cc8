use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ProcedureCategory {
    Surgical => "surgical",
    Ambulatory => "ambulatory",
});

str_enum!(AnesthesiaEvaluation {
    Unset => "unset",
    Approved => "approved",
    Rejected => "rejected",
    NeedsMoreInfo => "needs_more_info",
});

str_enum!(AihStage {
    PendingBilling => "pending_billing",
    PendingHospital => "pending_hospital",
    AwaitingRegulatorAck => "awaiting_regulator_ack",
    ExternalAuditor => "external_auditor",
    PendingCorrection => "pending_correction",
    Authorized => "authorized",
    NotApplicableUrgent => "not_applicable_urgent",
});

str_enum!(BillingLiberation {
    Unset => "unset",
    Liberated => "liberated",
    NotLiberated => "not_liberated",
});

str_enum!(Confirmation {
    Awaiting => "awaiting",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
});

str_enum!(AttachmentKind {
    Exam => "exam",
    AnesthesiaForm => "anesthesia_form",
});

impl AihStage {
    /// Position on the administrative timeline, left to right.
    /// `NotApplicableUrgent` sits outside the pipeline and has no position.
    pub fn pipeline_position(&self) -> Option<u8> {
        match self {
            Self::PendingBilling => Some(0),
            Self::PendingHospital => Some(1),
            Self::AwaitingRegulatorAck => Some(2),
            Self::ExternalAuditor => Some(3),
            Self::PendingCorrection => Some(4),
            Self::Authorized => Some(5),
            Self::NotApplicableUrgent => None,
        }
    }
}
