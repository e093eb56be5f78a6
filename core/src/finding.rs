//! Annotated, persisted record derived from an [`crate::observation::Observation`].

use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// GeoIP annotation attached to a [`Finding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoIp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub ip: String,
}

/// A persisted, annotated observation. Only fields whose semantic value is
/// known are serialized — absence must not be confused with `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    pub size: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoip: Option<GeoIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangerous_country: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns_blacklisted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangerous_protocol: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_device: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unapproved_device: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_anomaly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_of_hours: Option<bool>,

    /// ISO-8601 local-offset timestamp, assigned at persistence time (not
    /// capture time). Empty until the Store stamps it in `save_finding`.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub timestamp: String,
}

impl Finding {
    /// Seed a Finding from the raw Observation fields; all annotation
    /// fields start `None` and are filled in by [`Finding::merge_from`].
    pub fn from_observation(obs: &Observation) -> Self {
        Finding {
            src_mac: obs.src_mac.clone(),
            dst_mac: obs.dst_mac.clone(),
            src_ip: obs.src_ip.clone(),
            dst_ip: obs.dst_ip.clone(),
            protocol: obs.protocol.clone(),
            src_port: obs.src_port,
            dst_port: obs.dst_port,
            size: obs.size,
            ..Default::default()
        }
    }

    /// Fill in any annotation fields from `other` that are currently
    /// `None` on `self`. First non-null value wins — later sub-steps
    /// never overwrite an already-filled field.
    pub fn merge_from(&mut self, other: &AnnotationPatch) {
        macro_rules! fill {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = other.$field.clone();
                }
            };
        }
        fill!(geoip);
        fill!(country_code);
        fill!(dangerous_country);
        fill!(reverse_dns);
        fill!(reverse_dns_blacklisted);
        fill!(dangerous_protocol);
        fill!(new_device);
        fill!(unapproved_device);
        fill!(traffic_anomaly);
        fill!(out_of_hours);
        if self.protocol.is_none() {
            self.protocol = other.protocol.clone();
        }
    }
}

/// The output of a single analyzer sub-step: a sparse set of annotation
/// fields to merge into the Finding under construction.
#[derive(Debug, Clone, Default)]
pub struct AnnotationPatch {
    pub protocol: Option<String>,
    pub geoip: Option<GeoIp>,
    pub country_code: Option<String>,
    pub dangerous_country: Option<bool>,
    pub reverse_dns: Option<String>,
    pub reverse_dns_blacklisted: Option<bool>,
    pub dangerous_protocol: Option<bool>,
    pub new_device: Option<bool>,
    pub unapproved_device: Option<bool>,
    pub traffic_anomaly: Option<bool>,
    pub out_of_hours: Option<bool>,
}
