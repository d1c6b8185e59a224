/// Integration tests for the registry, custom checks and the request workflow.
///
/// Scenarios:
/// 1. signatures resolve through the registry, malformed ones are denied
/// 2. a custom evaluator replaces the default algorithm
/// 3. request -> approve -> granted, then removal by the creator
/// 4. a configured `Authority` wires everything together
use async_trait::async_trait;
use authority_lib::config::{AuthorityConfig, CheckConfig, PermissionSetConfig};
use authority_lib::models::{Actor, ContentType, ObjectRef, Subject, Target, User};
use authority_lib::permissions::requests::{
    self, install_workflow_permissions, APPROVE_PERMISSION_REQUESTS,
};
use authority_lib::permissions::{CustomCheck, PermissionRegistry, PermissionSet, Resolver};
use authority_lib::store::{PermissionStore, SqliteStore};
use authority_lib::{Authority, AuthorityError, Result};
use std::sync::Arc;

fn flatpage_type() -> ContentType {
    ContentType::new("flatpages", "flatpage")
}

fn flatpage(id: &str) -> ObjectRef {
    ObjectRef::new(flatpage_type(), id)
}

/// Top secret pages need both the browse and the top_secret grant.
struct TopSecret;

#[async_trait]
impl CustomCheck for TopSecret {
    async fn evaluate(&self, resolver: &mut Resolver, targets: &[Target]) -> Result<bool> {
        Ok(resolver.can("browse", false, targets).await?
            && resolver.can("top_secret", false, targets).await?)
    }
}

async fn setup() -> (Arc<dyn PermissionStore>, PermissionRegistry, User) {
    let store = SqliteStore::open(":memory:").await.unwrap();
    install_workflow_permissions(&store).await.unwrap();
    store.register_content_type(&flatpage_type()).await.unwrap();

    let user = User::new("jezdez".to_string());
    store.create_user(&user).await.unwrap();

    let mut registry = PermissionRegistry::new();
    registry
        .register(
            Some(flatpage_type()),
            PermissionSet::new("flatpage")
                .with_custom_check("top_secret", Arc::new(TopSecret))
                .with_verbose_check("review", "Can review this page"),
        )
        .unwrap();

    (Arc::new(store), registry, user)
}

#[tokio::test]
async fn test_malformed_signatures_are_denied() {
    let (store, registry, user) = setup().await;
    let actor = Actor::User(user);

    for signature in [
        "fail",
        "",
        "nope_permission.browse",
        "flatpage_permission.publish",
        "flatpage_permission.delete_user",
    ] {
        assert!(
            registry
                .get_check(store.clone(), actor.clone(), signature)
                .is_none(),
            "{} should not resolve",
            signature
        );
    }
}

#[tokio::test]
async fn test_custom_check_replaces_default() {
    let (store, registry, user) = setup().await;
    let page = flatpage("1");
    let targets = [Target::Instance(page.clone())];

    let mut assigner = Resolver::new(
        store.clone(),
        registry.get_permission_by_label("flatpage_permission").unwrap(),
    )
    .with_user(user.clone());

    // The top_secret grant alone is not enough for the custom check.
    assigner
        .assign(&["top_secret"], &targets, false)
        .await
        .unwrap();
    let mut check = registry
        .get_check(store.clone(), Actor::User(user.clone()), "flatpage_permission.top_secret")
        .unwrap();
    assert!(!check.call(&targets).await.unwrap());

    assigner.assign(&["browse"], &targets, false).await.unwrap();
    let mut check = registry
        .get_check(store.clone(), Actor::User(user.clone()), "flatpage_permission.top_secret")
        .unwrap();
    assert!(check.call(&targets).await.unwrap());

    let mut browse = registry
        .get_check(store.clone(), Actor::User(user), "flatpage_permission.browse")
        .unwrap();
    assert!(browse.call(&targets).await.unwrap());
    assert!(!browse.call(&[Target::Instance(flatpage("2"))]).await.unwrap());
}

#[tokio::test]
async fn test_generic_signature() {
    let (store, registry, user) = setup().await;
    let page = flatpage("1");
    let set = registry.get_permission_by_label("flatpage_permission").unwrap();

    Resolver::new(store.clone(), set)
        .with_user(user.clone())
        .assign(&["delete"], &[Target::Instance(page.clone())], true)
        .await
        .unwrap();

    let mut generic = registry
        .get_check(store.clone(), Actor::User(user.clone()), "flatpage_permission.delete_flatpage")
        .unwrap();
    assert!(generic.call(&[Target::Instance(page.clone())]).await.unwrap());

    let mut plain = registry
        .get_check(store, Actor::User(user), "flatpage_permission.delete")
        .unwrap();
    assert!(!plain.call(&[Target::Instance(page)]).await.unwrap());
}

#[tokio::test]
async fn test_choices_for_flatpage() {
    let (_store, registry, _user) = setup().await;
    let choices = registry.get_choices_for(&Target::instance("flatpages", "flatpage", "1"));

    assert_eq!(
        choices,
        vec![
            ("flatpage_permission.add".to_string(), "Can add this flatpage".to_string()),
            ("flatpage_permission.browse".to_string(), "Can browse this flatpage".to_string()),
            ("flatpage_permission.change".to_string(), "Can change this flatpage".to_string()),
            ("flatpage_permission.delete".to_string(), "Can delete this flatpage".to_string()),
            (
                "flatpage_permission.top_secret".to_string(),
                "flatpage_permission.top_secret".to_string()
            ),
            ("flatpage_permission.review".to_string(), "Can review this page".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_request_approve_revoke_flow() {
    let (store, registry, user) = setup().await;
    let page = flatpage("1");
    let set = registry.get_permission_by_label("flatpage_permission").unwrap();
    let mut r = Resolver::new(store.clone(), set).with_user(user.clone());

    let request = r
        .request_perm("flatpage_permission.review", &page)
        .await
        .unwrap();
    assert!(!r
        .has_perm("flatpage_permission.review", &page, true, true)
        .await
        .unwrap());
    assert!(r
        .requested_perm("flatpage_permission.review", &page, true)
        .await
        .unwrap());

    // A regular user gets the approval permission through a group.
    let moderator = User::new("moderator".to_string());
    store.create_user(&moderator).await.unwrap();
    let denied = requests::approve(store.as_ref(), &request.grant_id, &moderator).await;
    assert!(matches!(denied, Err(AuthorityError::PermissionDenied(_))));

    let mods = authority_lib::models::Group::new("moderators".to_string());
    store.create_group(&mods).await.unwrap();
    store
        .add_user_to_group(&moderator.user_id, &mods.group_id)
        .await
        .unwrap();
    let perms = install_workflow_permissions(store.as_ref()).await.unwrap();
    let approve_perm = perms
        .iter()
        .find(|p| p.full_codename() == APPROVE_PERMISSION_REQUESTS)
        .unwrap();
    store
        .attach_coarse_permission(&Subject::Group(mods.group_id.clone()), &approve_perm.permission_id)
        .await
        .unwrap();

    let approved = requests::approve(store.as_ref(), &request.grant_id, &moderator)
        .await
        .unwrap();
    assert!(approved.approved);
    assert!(approved.date_approved.is_some());

    r.invalidate_permissions_cache();
    assert!(r
        .has_perm("flatpage_permission.review", &page, true, true)
        .await
        .unwrap());
    assert!(matches!(
        r.request_perm("flatpage_permission.review", &page).await,
        Err(AuthorityError::AlreadyHasPermission { .. })
    ));

    requests::delete_grant(store.as_ref(), &request.grant_id, &user)
        .await
        .unwrap();
    r.invalidate_permissions_cache();
    assert!(!r
        .has_perm("flatpage_permission.review", &page, true, true)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_configured_authority() {
    let config = AuthorityConfig {
        database_path: ":memory:".to_string(),
        use_smart_cache: false,
        permission_sets: vec![PermissionSetConfig {
            name: "flatpage".to_string(),
            label: None,
            model: Some("flatpages.flatpage".to_string()),
            checks: vec![CheckConfig::Detailed {
                name: "review".to_string(),
                verbose_name: None,
            }],
        }],
    };
    let authority = Authority::open(&config).await.unwrap();
    let user = User::new("alice".to_string());
    authority.store.create_user(&user).await.unwrap();

    let mut r = authority
        .resolver_for("flatpage_permission", Actor::User(user))
        .unwrap();
    let page = Target::instance("flatpages", "flatpage", "3");

    assert!(!r.check("review", &[page.clone()]).await.unwrap());
    r.assign(&["review"], &[page.clone()], false).await.unwrap();
    // Without the smart cache every check hits the store.
    assert!(r.check("review", &[page]).await.unwrap());

    let before = authority.store.stats().subject_grant_queries();
    r.check("review", &[Target::instance("flatpages", "flatpage", "4")])
        .await
        .unwrap();
    assert!(authority.store.stats().subject_grant_queries() > before);
}
