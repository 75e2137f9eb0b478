//! Activity-seat flow: reserve, confirm payment, cancel, check in.

use serde::Serialize;
use wq_core::error::{ConflictKind, CoreError};
use wq_core::order_no::{self, REGISTRATION_PREFIX};
use wq_core::payment::{PaymentHandle, PaymentRequest};
use wq_core::rate_limit::keys;
use wq_core::status::{
    registration_transition, ActivityStatus, PaymentStatus, RegistrationEvent, RegistrationStatus,
};
use wq_core::types::{DbId, Money, Timestamp};
use wq_core::validation::{validate_phone, validate_required};
use wq_db::models::registration::{CreateRegistration, Registration, UQ_ACTIVE_REGISTRATION};
use wq_db::{ReservationStore, StoreTx, TransitionStamp};

use crate::error::{ensure_moved, LifecycleError, LifecycleResult};
use crate::manager::LifecycleManager;

/// Cancel reason recorded by the payment-timeout sweep.
pub const PAYMENT_TIMEOUT_REASON: &str = "payment timeout";

#[derive(Debug, Clone)]
pub struct ReserveSeat {
    pub activity_id: DbId,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatReservation {
    pub registration_id: DbId,
    pub order_no: String,
    pub is_free: bool,
    pub need_payment: bool,
    pub payment_amount: Money,
    pub payment_expire_time: Option<Timestamp>,
}

/// Result of a payment callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    /// The registration was already paid; nothing changed.
    AlreadyPaid,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationPaymentStatus {
    pub order_no: String,
    pub payment_status: PaymentStatus,
    pub payment_time: Option<Timestamp>,
    pub is_paid: bool,
    pub is_expired: bool,
}

impl<S: ReservationStore> LifecycleManager<S> {
    /// Take one seat on an activity.
    ///
    /// Locked read of the activity, the availability checks, then a
    /// compare-and-swap increment against the value read. Losing the CAS
    /// reports [`ConflictKind::CapacityFull`] and commits nothing.
    pub async fn reserve_seat(&self, input: ReserveSeat) -> LifecycleResult<SeatReservation> {
        validate_required("user_id", &input.user_id)?;
        validate_required("user_name", &input.user_name)?;
        let phone = input.user_phone.filter(|p| !p.trim().is_empty());
        if let Some(phone) = &phone {
            validate_phone("user_phone", phone)?;
        }
        self.rate_limit(
            &keys::activity_register(&input.user_id),
            self.config.order_create_limit,
        )?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let activity = tx
            .lock_activity(input.activity_id)
            .await?
            .filter(|a| !a.deleted)
            .ok_or_else(|| CoreError::not_found("Activity", input.activity_id))?;

        if activity.status()? != ActivityStatus::Registering {
            return Err(LifecycleError::conflict(ConflictKind::NotRegistering));
        }
        if activity.deadline_passed(now) {
            return Err(LifecycleError::conflict(ConflictKind::DeadlinePassed));
        }
        if !activity.has_free_seat() {
            return Err(LifecycleError::conflict(ConflictKind::CapacityFull));
        }
        if tx
            .has_active_registration(activity.id, &input.user_id)
            .await?
        {
            return Err(LifecycleError::conflict(ConflictKind::DuplicateRegistration));
        }

        if tx.increment_reserved(activity.id, activity.reserved).await? == 0 {
            tracing::info!(activity_id = activity.id, "Seat lost to a concurrent reservation");
            return Err(LifecycleError::conflict(ConflictKind::CapacityFull));
        }

        let is_free = activity.is_free();
        let create = CreateRegistration {
            activity_id: activity.id,
            user_id: input.user_id,
            user_name: input.user_name,
            user_phone: phone,
            remarks: input.remarks,
            payment_status: if is_free {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Unpaid
            },
            payment_amount: activity.price,
            payment_time: is_free.then_some(now),
            payment_expire_time: (!is_free).then(|| now + self.config.registration_payment_window),
            order_no: order_no::generate(REGISTRATION_PREFIX, now),
            created_at: now,
        };
        let registration = match tx.insert_registration(&create).await {
            Ok(reg) => reg,
            Err(err) if err.is_unique_violation(UQ_ACTIVE_REGISTRATION) => {
                return Err(LifecycleError::conflict(ConflictKind::DuplicateRegistration));
            }
            Err(err) => return Err(err.into()),
        };
        tx.commit().await?;

        tracing::info!(
            activity_id = activity.id,
            registration_id = registration.id,
            user_id = %registration.user_id,
            order_no = %registration.order_no,
            is_free,
            "Seat reserved"
        );

        Ok(SeatReservation {
            registration_id: registration.id,
            order_no: registration.order_no,
            is_free,
            need_payment: !is_free,
            payment_amount: registration.payment_amount,
            payment_expire_time: registration.payment_expire_time,
        })
    }

    /// Cancel the user's registration for an activity and free its seat.
    ///
    /// With no live registration the newest cancelled one is used, so a
    /// repeated cancel reports [`ConflictKind::InvalidTransition`].
    pub async fn cancel_registration(
        &self,
        activity_id: DbId,
        user_id: &str,
        reason: Option<&str>,
    ) -> LifecycleResult<()> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let registration = tx
            .lock_latest_registration(activity_id, user_id)
            .await?
            .ok_or_else(|| {
                CoreError::not_found_by(
                    "Registration",
                    format!("for activity {activity_id} and user {user_id}"),
                )
            })?;
        cancel_locked_registration(&mut tx, &registration, now, reason).await?;
        tx.commit().await?;

        tracing::info!(
            activity_id,
            registration_id = registration.id,
            user_id,
            "Registration cancelled"
        );
        Ok(())
    }

    /// Payment callback for a priced registration, keyed by order number.
    ///
    /// A repeated callback for an already-paid registration is a no-op. A
    /// callback arriving after the payment window cancels the registration
    /// (releasing the seat), commits that, and reports
    /// [`ConflictKind::Expired`].
    pub async fn confirm_registration_payment(
        &self,
        order_no: &str,
    ) -> LifecycleResult<Confirmation> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let registration = tx
            .lock_registration_by_order_no(order_no)
            .await?
            .ok_or_else(|| CoreError::not_found_by("Registration", order_no))?;
        let status = registration.status()?;
        let payment = registration.payment_status()?;

        if status != RegistrationStatus::Cancelled && payment == PaymentStatus::Paid {
            tracing::warn!(
                order_no,
                registration_id = registration.id,
                "Duplicate payment callback ignored"
            );
            return Ok(Confirmation::AlreadyPaid);
        }

        let target = registration_transition(status, payment, RegistrationEvent::ConfirmPayment)?;

        if registration.payment_expired(now) {
            cancel_locked_registration(&mut tx, &registration, now, Some(PAYMENT_TIMEOUT_REASON))
                .await?;
            tx.commit().await?;
            tracing::warn!(
                order_no,
                registration_id = registration.id,
                "Payment arrived after the window closed; registration cancelled"
            );
            return Err(LifecycleError::conflict(ConflictKind::Expired {
                entity: "registration",
            }));
        }

        let moved = tx
            .transition_registration(
                registration.id,
                (status, payment),
                target,
                TransitionStamp::paid(now),
            )
            .await?;
        ensure_moved(
            moved,
            "registration",
            status_label(status, payment),
            RegistrationEvent::ConfirmPayment.name(),
        )?;
        tx.commit().await?;

        tracing::info!(
            order_no,
            registration_id = registration.id,
            amount = %registration.payment_amount,
            "Registration payment confirmed"
        );
        Ok(Confirmation::Confirmed)
    }

    /// Open a payment with the provider for an unpaid, priced registration.
    pub async fn registration_pay_params(
        &self,
        registration_id: DbId,
        order_no: &str,
    ) -> LifecycleResult<PaymentHandle> {
        let registration = self.owned_registration(registration_id, order_no).await?;
        self.rate_limit(
            &keys::order_pay(&registration.user_id),
            self.config.order_pay_limit,
        )?;

        let status = registration.status()?;
        let payment = registration.payment_status()?;
        registration_transition(status, payment, RegistrationEvent::ConfirmPayment)?;
        if registration.payment_amount <= Money::ZERO {
            return Err(CoreError::Validation("registration has nothing to pay".into()).into());
        }

        let now = self.clock.now();
        if registration.payment_expired(now) {
            return Err(LifecycleError::conflict(ConflictKind::Expired {
                entity: "registration",
            }));
        }

        let request = PaymentRequest {
            out_trade_no: registration.order_no.clone(),
            amount: registration.payment_amount,
            payer: registration.user_id.clone(),
            description: format!("Activity registration {}", registration.activity_id),
        };
        let handle = self.payments.create_payment(&request, now).await?;
        tracing::debug!(registration_id, order_no, "Payment parameters issued");
        Ok(handle)
    }

    pub async fn registration_payment_status(
        &self,
        registration_id: DbId,
        order_no: &str,
    ) -> LifecycleResult<RegistrationPaymentStatus> {
        let registration = self.owned_registration(registration_id, order_no).await?;
        let payment_status = registration.payment_status()?;
        let is_paid = payment_status == PaymentStatus::Paid;
        Ok(RegistrationPaymentStatus {
            is_expired: !is_paid && registration.payment_expired(self.clock.now()),
            order_no: registration.order_no,
            payment_status,
            payment_time: registration.payment_time,
            is_paid,
        })
    }

    /// `registered ∧ paid → checked-in`.
    pub async fn check_in(&self, registration_id: DbId) -> LifecycleResult<()> {
        let mut tx = self.store.begin().await?;
        let registration = tx
            .lock_registration(registration_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Registration", registration_id))?;
        let status = registration.status()?;
        let payment = registration.payment_status()?;
        let target = registration_transition(status, payment, RegistrationEvent::CheckIn)?;

        let moved = tx
            .transition_registration(
                registration_id,
                (status, payment),
                target,
                TransitionStamp::default(),
            )
            .await?;
        ensure_moved(
            moved,
            "registration",
            status_label(status, payment),
            RegistrationEvent::CheckIn.name(),
        )?;
        tx.commit().await?;

        tracing::info!(registration_id, "Checked in");
        Ok(())
    }

    /// Cancel one registration whose payment window has closed.
    ///
    /// Returns `false` when the registration no longer qualifies (paid or
    /// cancelled since the sweep listed it).
    pub(crate) async fn expire_registration(&self, registration_id: DbId) -> LifecycleResult<bool> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let registration = tx
            .lock_registration(registration_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Registration", registration_id))?;

        let still_unpaid = registration.status()? == RegistrationStatus::Registered
            && registration.payment_status()? == PaymentStatus::Unpaid;
        if !still_unpaid || !registration.payment_expired(now) {
            return Ok(false);
        }

        cancel_locked_registration(&mut tx, &registration, now, Some(PAYMENT_TIMEOUT_REASON))
            .await?;
        tx.commit().await?;
        tracing::info!(
            registration_id,
            activity_id = registration.activity_id,
            "Unpaid registration expired"
        );
        Ok(true)
    }

    async fn owned_registration(
        &self,
        registration_id: DbId,
        order_no: &str,
    ) -> LifecycleResult<Registration> {
        let registration = self
            .store
            .find_registration(registration_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Registration", registration_id))?;
        if registration.order_no != order_no {
            return Err(CoreError::Validation(format!(
                "order number {order_no} does not belong to registration {registration_id}"
            ))
            .into());
        }
        Ok(registration)
    }
}

/// The one Cancel path for registrations: status change plus seat release,
/// inside the caller's transaction.
async fn cancel_locked_registration<T: StoreTx>(
    tx: &mut T,
    registration: &Registration,
    now: Timestamp,
    reason: Option<&str>,
) -> LifecycleResult<()> {
    let status = registration.status()?;
    let payment = registration.payment_status()?;
    let target = registration_transition(status, payment, RegistrationEvent::Cancel)?;

    let moved = tx
        .transition_registration(
            registration.id,
            (status, payment),
            target,
            TransitionStamp::cancelled(now, reason),
        )
        .await?;
    ensure_moved(
        moved,
        "registration",
        status_label(status, payment),
        RegistrationEvent::Cancel.name(),
    )?;
    tx.release_seat(registration.activity_id).await?;
    Ok(())
}

/// The label used in transition errors: the payment status while still
/// registered, the registration status otherwise.
fn status_label(status: RegistrationStatus, payment: PaymentStatus) -> &'static str {
    match status {
        RegistrationStatus::Registered => payment.name(),
        other => other.name(),
    }
}
