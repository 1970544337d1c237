//! A slice of the OCPP 1.6 core profile, enough to drive both endpoints

use std::sync::Once;

use serde::{Deserialize, Serialize};

use ocppj_shared::{Profile, Request, Response, Validate, ValidationContext, Validator};

pub const CORE_PROFILE: &str = "Core";

pub const BOOT_NOTIFICATION: &str = "BootNotification";
pub const HEARTBEAT: &str = "Heartbeat";
pub const AUTHORIZE: &str = "Authorize";
pub const CHANGE_AVAILABILITY: &str = "ChangeAvailability";

static REGISTER_RULES: Once = Once::new();

/// Registers the enum checks used by the payloads below
pub fn register_rules() {
    REGISTER_RULES.call_once(|| {
        let validator = Validator::global();
        validator.register_rule("registrationStatus", |value| {
            matches!(value, "Accepted" | "Pending" | "Rejected")
        });
        validator.register_rule("authorizationStatus", |value| {
            matches!(value, "Accepted" | "Blocked" | "Expired" | "Invalid" | "ConcurrentTx")
        });
        validator.register_rule("availabilityType", |value| {
            matches!(value, "Inoperative" | "Operative")
        });
        validator.register_rule("availabilityStatus", |value| {
            matches!(value, "Accepted" | "Rejected" | "Scheduled")
        });
    });
}

pub fn core_profile() -> Profile {
    register_rules();
    Profile::new(CORE_PROFILE)
        .add_feature::<BootNotificationRequest, BootNotificationResponse>(BOOT_NOTIFICATION)
        .add_feature::<HeartbeatRequest, HeartbeatResponse>(HEARTBEAT)
        .add_feature::<AuthorizeRequest, AuthorizeResponse>(AUTHORIZE)
        .add_feature::<ChangeAvailabilityRequest, ChangeAvailabilityResponse>(CHANGE_AVAILABILITY)
        .build()
}

// BootNotification

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    #[serde(default)]
    pub charge_point_model: String,
    #[serde(default)]
    pub charge_point_vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

impl BootNotificationRequest {
    pub fn new(model: &str, vendor: &str) -> Self {
        Self {
            charge_point_model: model.to_string(),
            charge_point_vendor: vendor.to_string(),
            ..Default::default()
        }
    }
}

impl Validate for BootNotificationRequest {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("ChargePointModel", &self.charge_point_model)
            .max_len("ChargePointModel", &self.charge_point_model, 20)
            .required("ChargePointVendor", &self.charge_point_vendor)
            .max_len("ChargePointVendor", &self.charge_point_vendor, 20);
        if let Some(serial) = &self.charge_point_serial_number {
            ctx.max_len("ChargePointSerialNumber", serial, 25);
        }
        if let Some(version) = &self.firmware_version {
            ctx.max_len("FirmwareVersion", version, 50);
        }
    }
}

impl Request for BootNotificationRequest {
    fn feature_name(&self) -> &'static str {
        BOOT_NOTIFICATION
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    #[serde(default)]
    pub current_time: String,
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub status: String,
}

impl BootNotificationResponse {
    pub fn accepted(current_time: &str, interval: i64) -> Self {
        Self {
            current_time: current_time.to_string(),
            interval,
            status: "Accepted".to_string(),
        }
    }
}

impl Validate for BootNotificationResponse {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("CurrentTime", &self.current_time)
            .gte("Interval", self.interval, 0)
            .required("Status", &self.status)
            .custom("Status", "registrationStatus", &self.status);
    }
}

impl Response for BootNotificationResponse {
    fn feature_name(&self) -> &'static str {
        BOOT_NOTIFICATION
    }
}

// Heartbeat

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

impl Validate for HeartbeatRequest {
    fn validate(&self, _ctx: &mut ValidationContext<'_>) {}
}

impl Request for HeartbeatRequest {
    fn feature_name(&self) -> &'static str {
        HEARTBEAT
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub current_time: String,
}

impl Validate for HeartbeatResponse {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("CurrentTime", &self.current_time);
    }
}

impl Response for HeartbeatResponse {
    fn feature_name(&self) -> &'static str {
        HEARTBEAT
    }
}

// Authorize

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub id_tag: String,
}

impl AuthorizeRequest {
    pub fn new(id_tag: &str) -> Self {
        Self {
            id_tag: id_tag.to_string(),
        }
    }
}

impl Validate for AuthorizeRequest {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("IdTag", &self.id_tag)
            .max_len("IdTag", &self.id_tag, 20);
    }
}

impl Request for AuthorizeRequest {
    fn feature_name(&self) -> &'static str {
        AUTHORIZE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl Validate for IdTagInfo {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("Status", &self.status)
            .custom("Status", "authorizationStatus", &self.status);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    #[serde(default)]
    pub id_tag_info: IdTagInfo,
}

impl AuthorizeResponse {
    pub fn new(status: &str) -> Self {
        Self {
            id_tag_info: IdTagInfo {
                status: status.to_string(),
                expiry_date: None,
            },
        }
    }
}

impl Validate for AuthorizeResponse {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.nested("IdTagInfo", &self.id_tag_info);
    }
}

impl Response for AuthorizeResponse {
    fn feature_name(&self) -> &'static str {
        AUTHORIZE
    }
}

// ChangeAvailability

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAvailabilityRequest {
    #[serde(default)]
    pub connector_id: i64,
    #[serde(default, rename = "type")]
    pub availability_type: String,
}

impl ChangeAvailabilityRequest {
    pub fn new(connector_id: i64, availability_type: &str) -> Self {
        Self {
            connector_id,
            availability_type: availability_type.to_string(),
        }
    }
}

impl Validate for ChangeAvailabilityRequest {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.gte("ConnectorId", self.connector_id, 0)
            .required("Type", &self.availability_type)
            .custom("Type", "availabilityType", &self.availability_type);
    }
}

impl Request for ChangeAvailabilityRequest {
    fn feature_name(&self) -> &'static str {
        CHANGE_AVAILABILITY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeAvailabilityResponse {
    #[serde(default)]
    pub status: String,
}

impl ChangeAvailabilityResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

impl Validate for ChangeAvailabilityResponse {
    fn validate(&self, ctx: &mut ValidationContext<'_>) {
        ctx.required("Status", &self.status)
            .custom("Status", "availabilityStatus", &self.status);
    }
}

impl Response for ChangeAvailabilityResponse {
    fn feature_name(&self) -> &'static str {
        CHANGE_AVAILABILITY
    }
}
