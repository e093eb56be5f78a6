//! Bearer-token auth middleware. `/health` is always exempt. When
//! `API_TOKEN` is unset, every request passes through.

use std::future::{ready, Ready};
use std::rc::Rc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;

pub struct BearerAuth {
    token: Option<Rc<str>>,
}

impl BearerAuth {
    pub fn new(token: Option<String>) -> Self {
        BearerAuth {
            token: token.map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = BearerAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthMiddleware {
            service,
            token: self.token.clone(),
        }))
    }
}

pub struct BearerAuthMiddleware<S> {
    service: S,
    token: Option<Rc<str>>,
}

impl<S, B> Service<ServiceRequest> for BearerAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let exempt = req.path() == "/health";
        let authorized = match &self.token {
            None => true,
            Some(_) if exempt => true,
            Some(expected) => req
                .headers()
                .get(actix_web::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v == expected.as_ref())
                .unwrap_or(false),
        };

        if authorized {
            let fut = self.service.call(req);
            Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
        } else {
            Box::pin(async move {
                let resp = HttpResponse::Unauthorized().finish();
                Ok(req.into_response(resp).map_into_right_body())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    use super::BearerAuth;

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn no_token_configured_lets_everything_through() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(None))
                .route("/protected", web::get().to(ok)),
        )
        .await;
        let req = test::TestRequest::get().uri("/protected").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn missing_bearer_header_is_rejected_when_token_set() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(Some("secret".to_string())))
                .route("/protected", web::get().to(ok)),
        )
        .await;
        let req = test::TestRequest::get().uri("/protected").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn correct_bearer_token_is_accepted() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(Some("secret".to_string())))
                .route("/protected", web::get().to(ok)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/protected")
            .insert_header(("Authorization", "Bearer secret"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn health_path_is_exempt_even_with_token_set() {
        let app = test::init_service(
            App::new()
                .wrap(BearerAuth::new(Some("secret".to_string())))
                .route("/health", web::get().to(ok)),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
