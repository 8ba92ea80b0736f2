use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPrescriptionInput {
    pub prescription_file: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlInput {
    pub file_name: String,
    pub content_type: String,
}

/// One medicine the pharmacist attaches at approval; `price` overrides the catalog price.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRequest {
    pub medicine_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveOrderInput {
    pub medicines: Vec<MedicineRequest>,
    #[serde(default)]
    pub pharmacist_notes: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectOrderInput {
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub payment_method: String,
    pub transaction_id: String,
}
