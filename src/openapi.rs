use utoipa::OpenApi;

/// OpenAPI document for the storefront checkout and payment surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::checkout::place_online_order,
        crate::handlers::checkout::place_cod_order,
        crate::handlers::checkout::reopen_session,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::report_payment_failure,
        crate::handlers::payments::open_invoice_session,
        crate::handlers::payments::verify_invoice_payment,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_items,
    ),
    components(schemas(
        crate::handlers::checkout::CheckoutRequest,
        crate::handlers::checkout::OnlineCheckoutResponse,
        crate::handlers::checkout::PaymentSessionResponse,
        crate::handlers::payments::VerifyPaymentBody,
        crate::handlers::payments::VerificationResponse,
        crate::handlers::payments::PaymentFailureBody,
        crate::handlers::payments::VerifyInvoicePaymentBody,
        crate::handlers::payments::InvoiceVerificationResponse,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Checkout", description = "Cart to order conversion and payment sessions"),
        (name = "Payments", description = "Payment verification and invoice settlement"),
        (name = "Orders", description = "Order confirmation views")
    )
)]
pub struct ApiDoc;
