use serde::{Deserialize, Serialize};

use super::inputs::MedicineRequest;
use crate::accounts::Identity;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Patient uploads a prescription, opening a new order
    SubmitPrescription {
        id: String,
        order_number: String,
        actor: Identity,
        prescription_reference: String,
        doctor_id: Option<String>,
    },

    /// Pharmacist prices the prescription and approves it
    ApproveOrder {
        actor: Identity,
        medicines: Vec<MedicineRequest>,
        pharmacist_notes: Option<String>,
        /// Key under which the taken stock is held until the commit settles
        reservation_id: String,
    },

    /// Pharmacist rejects the prescription
    RejectOrder {
        actor: Identity,
        rejection_reason: Option<String>,
    },

    /// Owning patient pays for an approved order
    PayOrder {
        actor: Identity,
        payment_method: String,
        transaction_id: String,
    },

    StartProcessing { actor: Identity },

    /// Pharmacist hands the order over to delivery
    MarkReadyForDispatch { actor: Identity },

    CompleteOrder { actor: Identity },
}
