//! Entity metadata and metadata policy, per entity type.
//!
//! Each table below yields the declared-metadata struct and the matching
//! policy struct. Claim names follow OpenID Connect Discovery, Dynamic
//! Client Registration and OpenID Federation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{metadata_claims, PolicyError};

/// A structured JSON claim (such as a key set) usable under policy.
///
/// Ordered by its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonClaim(pub Value);

impl Ord for JsonClaim {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.to_string().cmp(&other.0.to_string())
    }
}

impl PartialOrd for JsonClaim {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

metadata_claims! {
    /// Claims every entity type may carry.
    metadata CommonMetadata;
    /// Policy on [`CommonMetadata`].
    policy CommonMetadataPolicy;
    claims {
        organization_name: single String => "organization_name",
        organization_uri: single String => "organization_uri",
        homepage_uri: single String => "homepage_uri",
        signed_jwks_uri: single String => "signed_jwks_uri",
    }
}

metadata_claims! {
    /// `openid_relying_party` metadata.
    metadata RelyingPartyMetadata;
    /// Policy on [`RelyingPartyMetadata`].
    policy RelyingPartyPolicy;
    claims {
        client_id: single String => "client_id",
        client_registration_types: list String => "client_registration_types",
        redirect_uris: list String => "redirect_uris",
        post_logout_redirect_uris: list String => "post_logout_redirect_uris",
        request_uris: list String => "request_uris",
        response_types: list String => "response_types",
        grant_types: list String => "grant_types",
        application_type: single String => "application_type",
        contacts: list String => "contacts",
        client_name: single String => "client_name",
        logo_uri: single String => "logo_uri",
        client_uri: single String => "client_uri",
        policy_uri: single String => "policy_uri",
        tos_uri: single String => "tos_uri",
        jwks_uri: single String => "jwks_uri",
        sector_identifier_uri: single String => "sector_identifier_uri",
        subject_type: single String => "subject_type",
        scope: single String => "scope",
        software_id: single String => "software_id",
        software_version: single String => "software_version",
        client_id_issued_at: single i64 => "client_id_issued_at",
        client_secret_expires_at: single i64 => "client_secret_expires_at",
        registration_access_token: single String => "registration_access_token",
        registration_client_uri: single String => "registration_client_uri",
        token_endpoint_auth_method: single String => "token_endpoint_auth_method",
        token_endpoint_auth_signing_alg: single String => "token_endpoint_auth_signing_alg",
        id_token_signed_response_alg: single String => "id_token_signed_response_alg",
        id_token_encrypted_response_alg: single String => "id_token_encrypted_response_alg",
        id_token_encrypted_response_enc: single String => "id_token_encrypted_response_enc",
        userinfo_signed_response_alg: single String => "userinfo_signed_response_alg",
        userinfo_encrypted_response_alg: single String => "userinfo_encrypted_response_alg",
        userinfo_encrypted_response_enc: single String => "userinfo_encrypted_response_enc",
        request_object_signing_alg: single String => "request_object_signing_alg",
        request_object_encryption_alg: single String => "request_object_encryption_alg",
        request_object_encryption_enc: single String => "request_object_encryption_enc",
        authorization_signed_response_alg: single String => "authorization_signed_response_alg",
        authorization_encrypted_response_alg: single String => "authorization_encrypted_response_alg",
        authorization_encrypted_response_enc: single String => "authorization_encrypted_response_enc",
        default_max_age: single i64 => "default_max_age",
        require_auth_time: single bool => "require_auth_time",
        default_acr_values: list String => "default_acr_values",
        initiate_login_uri: single String => "initiate_login_uri",
        tls_client_auth_subject_dn: single String => "tls_client_auth_subject_dn",
        tls_client_certificate_bound_access_tokens: single bool => "tls_client_certificate_bound_access_tokens",
        require_pushed_authorization_requests: single bool => "require_pushed_authorization_requests",
        backchannel_token_delivery_mode: single String => "backchannel_token_delivery_mode",
        backchannel_client_notification_endpoint: single String => "backchannel_client_notification_endpoint",
        backchannel_authentication_request_signing_alg: single String => "backchannel_authentication_request_signing_alg",
        backchannel_user_code_parameter: single bool => "backchannel_user_code_parameter",
        frontchannel_logout_uri: single String => "frontchannel_logout_uri",
        frontchannel_logout_session_required: single bool => "frontchannel_logout_session_required",
        backchannel_logout_uri: single String => "backchannel_logout_uri",
        backchannel_logout_session_required: single bool => "backchannel_logout_session_required",
        jwks: single JsonClaim => "jwks",
    }
    common common: CommonMetadata, CommonMetadataPolicy;
    extra {
        /// Client secret issued at registration.
        client_secret: String => "client_secret",
    }
}

metadata_claims! {
    /// `openid_provider` metadata.
    metadata OpenIdProviderMetadata;
    /// Policy on [`OpenIdProviderMetadata`].
    policy OpenIdProviderPolicy;
    claims {
        issuer: single String => "issuer",
        authorization_endpoint: single String => "authorization_endpoint",
        token_endpoint: single String => "token_endpoint",
        userinfo_endpoint: single String => "userinfo_endpoint",
        jwks_uri: single String => "jwks_uri",
        registration_endpoint: single String => "registration_endpoint",
        federation_registration_endpoint: single String => "federation_registration_endpoint",
        client_registration_types_supported: list String => "client_registration_types_supported",
        end_session_endpoint: single String => "end_session_endpoint",
        introspection_endpoint: single String => "introspection_endpoint",
        revocation_endpoint: single String => "revocation_endpoint",
        pushed_authorization_request_endpoint: single String => "pushed_authorization_request_endpoint",
        backchannel_authentication_endpoint: single String => "backchannel_authentication_endpoint",
        scopes_supported: list String => "scopes_supported",
        response_types_supported: list String => "response_types_supported",
        response_modes_supported: list String => "response_modes_supported",
        grant_types_supported: list String => "grant_types_supported",
        acr_values_supported: list String => "acr_values_supported",
        subject_types_supported: list String => "subject_types_supported",
        id_token_signing_alg_values_supported: list String => "id_token_signing_alg_values_supported",
        id_token_encryption_alg_values_supported: list String => "id_token_encryption_alg_values_supported",
        id_token_encryption_enc_values_supported: list String => "id_token_encryption_enc_values_supported",
        userinfo_signing_alg_values_supported: list String => "userinfo_signing_alg_values_supported",
        userinfo_encryption_alg_values_supported: list String => "userinfo_encryption_alg_values_supported",
        userinfo_encryption_enc_values_supported: list String => "userinfo_encryption_enc_values_supported",
        request_object_signing_alg_values_supported: list String => "request_object_signing_alg_values_supported",
        request_object_encryption_alg_values_supported: list String => "request_object_encryption_alg_values_supported",
        request_object_encryption_enc_values_supported: list String => "request_object_encryption_enc_values_supported",
        token_endpoint_auth_methods_supported: list String => "token_endpoint_auth_methods_supported",
        token_endpoint_auth_signing_alg_values_supported: list String => "token_endpoint_auth_signing_alg_values_supported",
        display_values_supported: list String => "display_values_supported",
        claim_types_supported: list String => "claim_types_supported",
        claims_supported: list String => "claims_supported",
        claims_locales_supported: list String => "claims_locales_supported",
        ui_locales_supported: list String => "ui_locales_supported",
        code_challenge_methods_supported: list String => "code_challenge_methods_supported",
        service_documentation: single String => "service_documentation",
        op_policy_uri: single String => "op_policy_uri",
        op_tos_uri: single String => "op_tos_uri",
        claims_parameter_supported: single bool => "claims_parameter_supported",
        request_parameter_supported: single bool => "request_parameter_supported",
        request_uri_parameter_supported: single bool => "request_uri_parameter_supported",
        require_request_uri_registration: single bool => "require_request_uri_registration",
        require_pushed_authorization_requests: single bool => "require_pushed_authorization_requests",
        tls_client_certificate_bound_access_tokens: single bool => "tls_client_certificate_bound_access_tokens",
        frontchannel_logout_supported: single bool => "frontchannel_logout_supported",
        frontchannel_logout_session_supported: single bool => "frontchannel_logout_session_supported",
        backchannel_logout_supported: single bool => "backchannel_logout_supported",
        backchannel_logout_session_supported: single bool => "backchannel_logout_session_supported",
        contacts: list String => "contacts",
        logo_uri: single String => "logo_uri",
        policy_uri: single String => "policy_uri",
    }
    common common: CommonMetadata, CommonMetadataPolicy;
}

metadata_claims! {
    /// `federation_entity` metadata.
    metadata FederationEntityMetadata;
    /// Policy on [`FederationEntityMetadata`].
    policy FederationEntityPolicy;
    claims {
        federation_fetch_endpoint: single String => "federation_fetch_endpoint",
        federation_list_endpoint: single String => "federation_list_endpoint",
        federation_resolve_endpoint: single String => "federation_resolve_endpoint",
        federation_trust_mark_status_endpoint: single String => "federation_trust_mark_status_endpoint",
        federation_trust_mark_list_endpoint: single String => "federation_trust_mark_list_endpoint",
        federation_trust_mark_endpoint: single String => "federation_trust_mark_endpoint",
        federation_historical_keys_endpoint: single String => "federation_historical_keys_endpoint",
        endpoint_auth_signing_alg_values_supported: list String => "endpoint_auth_signing_alg_values_supported",
        contacts: list String => "contacts",
        logo_uri: single String => "logo_uri",
        policy_uri: single String => "policy_uri",
    }
    common common: CommonMetadata, CommonMetadataPolicy;
}

impl FederationEntityMetadata {
    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Declared metadata of an entity, keyed by entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// OpenID Provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_provider: Option<OpenIdProviderMetadata>,

    /// Relying Party metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_relying_party: Option<RelyingPartyMetadata>,

    /// Federation entity metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_entity: Option<FederationEntityMetadata>,
}

impl Metadata {
    /// The federation fetch endpoint, if the entity declares one.
    pub fn federation_fetch_endpoint(&self) -> Option<&str> {
        self.federation_entity
            .as_ref()
            .and_then(|f| f.federation_fetch_endpoint.as_deref())
    }
}

/// Metadata policy of a statement, keyed by entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPolicy {
    /// Policy on OpenID Provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_provider: Option<OpenIdProviderPolicy>,

    /// Policy on Relying Party metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid_relying_party: Option<RelyingPartyPolicy>,

    /// Policy on federation entity metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_entity: Option<FederationEntityPolicy>,
}

impl MetadataPolicy {
    /// Combine with a subordinate's policy (`self` is the superior).
    ///
    /// A conflict in any entity type fails the whole combination.
    pub fn combine(self, inferior: Self) -> Result<Self, PolicyError> {
        Ok(Self {
            openid_provider: combine_section(
                self.openid_provider,
                inferior.openid_provider,
                OpenIdProviderPolicy::combine,
            )?,
            openid_relying_party: combine_section(
                self.openid_relying_party,
                inferior.openid_relying_party,
                RelyingPartyPolicy::combine,
            )?,
            federation_entity: combine_section(
                self.federation_entity,
                inferior.federation_entity,
                FederationEntityPolicy::combine,
            )?,
        })
    }

    /// Apply to declared metadata.
    ///
    /// Entity types the subject does not declare stay absent.
    pub fn enforce(&self, metadata: Metadata) -> Result<Metadata, PolicyError> {
        Ok(Metadata {
            openid_provider: enforce_section(
                self.openid_provider.as_ref(),
                metadata.openid_provider,
                OpenIdProviderPolicy::enforce,
            )?,
            openid_relying_party: enforce_section(
                self.openid_relying_party.as_ref(),
                metadata.openid_relying_party,
                RelyingPartyPolicy::enforce,
            )?,
            federation_entity: enforce_section(
                self.federation_entity.as_ref(),
                metadata.federation_entity,
                FederationEntityPolicy::enforce,
            )?,
        })
    }
}

fn combine_section<P>(
    superior: Option<P>,
    inferior: Option<P>,
    combine: fn(P, P) -> Result<P, PolicyError>,
) -> Result<Option<P>, PolicyError> {
    match (superior, inferior) {
        (Some(s), Some(i)) => combine(s, i).map(Some),
        (s, i) => Ok(s.or(i)),
    }
}

fn enforce_section<P, M>(
    policy: Option<&P>,
    metadata: Option<M>,
    enforce: fn(&P, M) -> Result<M, PolicyError>,
) -> Result<Option<M>, PolicyError> {
    match (policy, metadata) {
        (Some(policy), Some(metadata)) => enforce(policy, metadata).map(Some),
        (_, metadata) => Ok(metadata),
    }
}
