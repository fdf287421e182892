//! Built-in actions, endpoints and property types.

use super::{TypeGroup, TypeRegistryBuilder};
use crate::{
    actions::{data, flow, json, rest, stack_action_info},
    condition, endpoint, entity, query, request,
};

pub(super) fn register_all(builder: &mut TypeRegistryBuilder) {
    register_actions(builder);
    register_endpoints(builder);
    register_properties(builder);
}

fn register_actions(builder: &mut TypeRegistryBuilder) {
    builder
        .register_abstract(TypeGroup::Action, stack_action_info())
        .register_action(json::json_action_info(), json::build_json_action)
        .register_action(rest::rest_info(), rest::build_rest)
        .register_action(rest::request_info(), rest::build_request)
        .register_action(flow::if_info(), flow::build_if)
        .register_action(flow::switch_case_info(), flow::build_switch_case)
        .register_action(flow::foreach_info(), flow::build_foreach)
        .register_action(data::create_info(), data::build_create)
        .register_action(data::read_info(), data::build_read)
        .register_action(data::read_first_info(), data::build_read_first)
        .register_action(data::update_info(), data::build_update)
        .register_action(data::delete_info(), data::build_delete)
        .register_action(data::count_info(), data::build_count);
}

fn register_endpoints(builder: &mut TypeRegistryBuilder) {
    builder
        .register_abstract(TypeGroup::Endpoint, endpoint::endpoint_info())
        .register_abstract(TypeGroup::Endpoint, endpoint::graph_info())
        .register_endpoint(endpoint::controller_info(), endpoint::build_controller)
        .register_endpoint(endpoint::query_info(), endpoint::build_graph)
        .register_endpoint(endpoint::mutation_info(), endpoint::build_graph);
}

fn register_properties(builder: &mut TypeRegistryBuilder) {
    builder
        .register_abstract(TypeGroup::Property, condition::condition_info())
        .register_property(condition::operator_condition_info(), condition::parse_operator_condition)
        .register_property(condition::null_or_empty_info(), condition::parse_null_or_empty)
        .register_property(query::rules::filter_rule_info(), query::rules::parse_filter_rule)
        .register_property(query::rules::order_rule_info(), query::rules::parse_order_rule)
        .register_property(query::rules::rule_set_info(), query::rules::parse_rule_set)
        .register_property(entity::entity_info(), entity::parse_entity)
        .register_property(entity::entity_select_info(), entity::parse_entity_select)
        .register_property(request::request_spec_info(), request::parse_request_spec);
}
