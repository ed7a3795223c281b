//! Key-delivery messages.
//!
//! Builds the subject and plain-text body sent to a customer with their key.
//! Sending the message is left to whatever mail transport the caller uses.

use crate::plans::Plan;
use crate::records::{CustomerRecord, LicenseRecord, PLACEHOLDER_CUSTOMER_NAME};

/// Branding used in delivery messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTemplate {
    pub product_name: String,
    pub support_email: String,
}

impl Default for DeliveryTemplate {
    fn default() -> Self {
        Self {
            product_name: "ClausoNet 4.0 Pro".to_string(),
            support_email: "support@clausonet.com".to_string(),
        }
    }
}

/// A composed message, ready to hand to a mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDelivery {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl KeyDelivery {
    /// Compose with the default template.
    pub fn compose(license: &LicenseRecord, customer: &CustomerRecord) -> Self {
        Self::compose_with(&DeliveryTemplate::default(), license, customer)
    }

    pub fn compose_with(
        template: &DeliveryTemplate,
        license: &LicenseRecord,
        customer: &CustomerRecord,
    ) -> Self {
        let plan = license.plan.label();
        let greeting = if customer.name.is_empty() || customer.name == PLACEHOLDER_CUSTOMER_NAME {
            "Valued Customer"
        } else {
            customer.name.as_str()
        };

        let mut body = format!(
            "Dear {greeting},\n\
             \n\
             Thank you for choosing {product}!\n\
             \n\
             Your {plan} License Key: {key}\n\
             \n\
             ACTIVATION INSTRUCTIONS:\n\
             1. Download {product} from our website\n\
             2. Open the application\n\
             3. Go to Settings > License\n\
             4. Enter your license key: {key}\n\
             5. Click \"Activate License\"\n\
             \n\
             FEATURES INCLUDED:\n",
            product = template.product_name,
            key = license.key,
        );

        for feature in &license.features {
            body.push_str(&format!("- {}\n", feature_label(feature)));
        }

        body.push_str(&format!(
            "\nLicense Details:\n\
             - Type: {plan}\n\
             - Valid Until: {valid_until}\n\
             - Max Devices: {devices}\n\
             \n\
             Need help? Contact {support}\n\
             \n\
             Best regards,\n\
             The {product} Team\n",
            valid_until = license.expiry_date.format("%Y-%m-%d"),
            devices = license.max_devices,
            support = template.support_email,
            product = template.product_name,
        ));

        Self {
            to: customer.email.clone(),
            subject: subject_for(template, license.plan),
            body,
        }
    }
}

fn subject_for(template: &DeliveryTemplate, plan: Plan) -> String {
    format!(
        "{} - Your {} License Key",
        template.product_name,
        plan.label()
    )
}

/// `batch_processing` → `Batch Processing`.
fn feature_label(feature: &str) -> String {
    feature
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
