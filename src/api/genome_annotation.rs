//! Purpose: Typed call sites for the `genome_annotaiton_api` service.
//! Exports: `GenomeAnnotationClient`, `SERVICE_NAME`.
//! Role: Stateless wrappers; each names a procedure, orders its arguments, and picks a result type.
//! Invariants: The service name keeps the deployed spelling (`annotaiton`).
//! Invariants: Every procedure requires authentication; anonymous clients fail before sending.
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, RpcClient};
use super::records::{FeatureData, FeatureIdFilters, FeatureIdMapping, ProteinData, Region};
use crate::core::caller::AuthPolicy;
use crate::core::envelope::RpcContext;
use crate::core::shape::Typed;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

pub const SERVICE_NAME: &str = "genome_annotaiton_api";

pub type StringMap = BTreeMap<String, String>;
pub type ListMap = BTreeMap<String, Vec<String>>;

#[derive(Clone)]
pub struct GenomeAnnotationClient {
    client: RpcClient,
}

impl GenomeAnnotationClient {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.client
    }

    /// Qualified procedure name, e.g. `genome_annotaiton_api.get_taxon`.
    pub fn method_name(procedure: &str) -> String {
        format!("{SERVICE_NAME}.{procedure}")
    }

    fn call<T, A>(&self, procedure: &str, args: &A, context: Option<&RpcContext>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        A: Serialize + Sync + ?Sized,
    {
        self.client.invoke_with(
            &Self::method_name(procedure),
            args,
            &Typed::<T>::new(),
            context,
            AuthPolicy::Required,
        )
    }

    /// Reference of the Taxon associated with the annotation object `object_ref`.
    pub fn get_taxon(&self, object_ref: &str, context: Option<&RpcContext>) -> ApiResult<String> {
        self.call("get_taxon", &(object_ref,), context)
    }

    /// Reference of the Assembly associated with the annotation object.
    pub fn get_assembly(&self, object_ref: &str, context: Option<&RpcContext>) -> ApiResult<String> {
        self.call("get_assembly", &(object_ref,), context)
    }

    pub fn get_feature_types(
        &self,
        object_ref: &str,
        context: Option<&RpcContext>,
    ) -> ApiResult<Vec<String>> {
        self.call("get_feature_types", &(object_ref,), context)
    }

    pub fn get_feature_type_descriptions(
        &self,
        object_ref: &str,
        feature_type_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_feature_type_descriptions",
            &(object_ref, feature_type_list),
            context,
        )
    }

    pub fn get_feature_type_counts(
        &self,
        object_ref: &str,
        feature_type_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<BTreeMap<String, i64>> {
        self.call(
            "get_feature_type_counts",
            &(object_ref, feature_type_list),
            context,
        )
    }

    /// Feature ids matching `filters`, grouped by `group_type`
    /// (`type`, `region`, `function` or `alias`).
    pub fn get_feature_ids(
        &self,
        object_ref: &str,
        filters: &FeatureIdFilters,
        group_type: &str,
        context: Option<&RpcContext>,
    ) -> ApiResult<FeatureIdMapping> {
        self.call(
            "get_feature_ids",
            &(object_ref, filters, group_type),
            context,
        )
    }

    pub fn get_features(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<BTreeMap<String, FeatureData>> {
        self.call(
            "get_features",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_proteins(
        &self,
        object_ref: &str,
        context: Option<&RpcContext>,
    ) -> ApiResult<BTreeMap<String, ProteinData>> {
        self.call("get_proteins", &(object_ref,), context)
    }

    pub fn get_feature_locations(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<BTreeMap<String, Vec<Region>>> {
        self.call(
            "get_feature_locations",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_feature_publications(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<ListMap> {
        self.call(
            "get_feature_publications",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_feature_dna(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_feature_dna",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_feature_functions(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_feature_functions",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_feature_aliases(
        &self,
        object_ref: &str,
        feature_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<ListMap> {
        self.call(
            "get_feature_aliases",
            &(object_ref, feature_id_list),
            context,
        )
    }

    pub fn get_cds_by_gene(
        &self,
        object_ref: &str,
        gene_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<ListMap> {
        self.call(
            "get_cds_by_gene",
            &(object_ref, gene_id_list),
            context,
        )
    }

    pub fn get_cds_by_mrna(
        &self,
        object_ref: &str,
        mrna_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_cds_by_mrna",
            &(object_ref, mrna_id_list),
            context,
        )
    }

    pub fn get_gene_by_cds(
        &self,
        object_ref: &str,
        cds_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_gene_by_cds",
            &(object_ref, cds_id_list),
            context,
        )
    }

    pub fn get_gene_by_mrna(
        &self,
        object_ref: &str,
        mrna_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_gene_by_mrna",
            &(object_ref, mrna_id_list),
            context,
        )
    }

    pub fn get_mrna_by_cds(
        &self,
        object_ref: &str,
        cds_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<StringMap> {
        self.call(
            "get_mrna_by_cds",
            &(object_ref, cds_id_list),
            context,
        )
    }

    pub fn get_mrna_by_gene(
        &self,
        object_ref: &str,
        gene_id_list: &[String],
        context: Option<&RpcContext>,
    ) -> ApiResult<ListMap> {
        self.call(
            "get_mrna_by_gene",
            &(object_ref, gene_id_list),
            context,
        )
    }
}
