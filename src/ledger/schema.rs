diesel::table! {
    alarm_ledger (id) {
        id -> Integer,
        scheduled_at -> BigInt,
        reminder_id -> Nullable<Integer>,
        created_at -> BigInt,
    }
}
