//! Purpose: Data records exchanged with `genome_annotaiton_api` procedures.
//! Exports: `Region`, `FeatureIdFilters`, `FeatureIdMapping`, `FeatureData`, `ProteinData`,
//!          `AnnotationResults`.
//! Role: Declared fields plus an open `extra` map so unknown properties survive a round trip.
//! Invariants: Absent optional fields are omitted on encode, never sent as `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Properties the server sent that this client does not declare.
pub type Extra = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contig_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureIdFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_list: Option<Vec<Region>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_list: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureIdMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_type: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_region: Option<BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_function: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_alias: Option<BTreeMap<String, Vec<String>>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_aliases: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_dna_sequence_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_dna_sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_locations: Option<Vec<Region>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_publications: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_quality_warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_quality_score: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_inference: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProteinData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_amino_acid_sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_aliases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_domain_locations: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}
