use serde::{Deserialize, Serialize};

/// Appointment lifecycle states. `canceled` frees the slot; every other
/// status keeps it occupied.
pub const APPOINTMENT_STATUSES: [&str; 4] = ["pending", "confirmed", "canceled", "completed"];

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Barbershop {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub slug: Option<String>,
    pub default_deposit_percentage: i64,
    pub platform_fee: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BarbershopUser {
    pub id: i64,
    pub barbershop_id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub barbershop_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_minutes: i64,
    pub deposit_percentage: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTime {
    pub id: i64,
    pub barbershop_id: i64,
    pub date_from: String,
    pub date_to: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub reason: Option<String>,
    pub created_at: String,
}

// ── Projections ──

/// Directory card: what anyone may see about a shop.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShopCard {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub slug: Option<String>,
}

/// Booking-page shop info: card fields plus the pricing knobs the booking
/// flow snapshots onto each appointment.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShopBookingInfo {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub slug: Option<String>,
    pub default_deposit_percentage: i64,
    pub platform_fee: i64,
}

/// Service as exposed to booking clients (no tenant column).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServicePublic {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_minutes: i64,
    pub deposit_percentage: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHourItem {
    pub id: i64,
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
}

/// Owner-facing appointment row joined with its service.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetail {
    pub id: i64,
    pub service_id: i64,
    pub service_name: String,
    pub service_price: i64,
    pub date: String,
    pub time: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub deposit_amount: i64,
    pub platform_fee: i64,
    pub total_to_pay: i64,
    pub created_at: String,
}

// ── Public booking API ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub service_id: i64,
    pub date: String,
    pub step: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServicePublic>,
    pub slots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesResponse {
    pub items: Vec<ServicePublic>,
    pub barbershop_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    pub service_id: i64,
    pub date: String,
    pub time: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: i64,
}

// ── Account API ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub shop_name: String,
    pub city: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub owner_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub barbershop_id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authenticated user view (never carries the password hash).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub barbershop_id: i64,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupShop {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub token: String,
    pub barbershop: SignupShop,
    pub user: AuthUser,
}

// ── Owner admin API ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    pub name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub slug: Option<String>,
    pub default_deposit_percentage: Option<i64>,
    pub platform_fee: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShopRequest {
    pub name: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub default_deposit_percentage: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSettings {
    pub id: i64,
    pub default_deposit_percentage: i64,
}

/// Weekly template write payload. Two shapes are accepted:
/// `{items: [{weekday, startTime, endTime}]}` or
/// `{days: [{weekday, ranges: [{start, end}]}]}`.
#[derive(Debug, Deserialize)]
pub struct WorkingHoursPayload {
    pub items: Option<Vec<WorkingHourInput>>,
    pub days: Option<Vec<DayRanges>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHourInput {
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct DayRanges {
    pub weekday: i64,
    pub ranges: Vec<StartEnd>,
}

#[derive(Debug, Deserialize)]
pub struct StartEnd {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedTimeRequest {
    pub date_from: String,
    pub date_to: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_minutes: Option<i64>,
    pub deposit_percentage: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub deposit_percentage: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: String,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
